use satcore::services::{install_services, SimHardware};
use satcore::settings::*;
use satcore::telemetry::ExecEvent;
use satcore::*;

#[test]
fn test_registration_rejected_once_started() {
    let hardware = SimHardware::new();
    let mut exec = OnboardExecutive::new();
    install_services(&mut exec, &hardware.drivers()).unwrap();
    exec.start().unwrap();

    // Installing a second time fails on the first App.
    assert_eq!(
        install_services(&mut exec, &hardware.drivers()),
        Err(ExecutiveError::Registration(RegistrationError::Frozen))
    );
    assert_eq!(exec.apps().len(), APP_NAMES.len());
}

#[test]
fn test_duplicate_roster_rejected_before_start() {
    let hardware = SimHardware::new();
    let mut exec = OnboardExecutive::new();
    install_services(&mut exec, &hardware.drivers()).unwrap();

    assert_eq!(
        install_services(&mut exec, &hardware.drivers()),
        Err(ExecutiveError::Registration(RegistrationError::DuplicateName("update_adc".into())))
    );
}

#[test]
fn test_telemetry_frame_drains_events() {
    let hardware = SimHardware::new();
    let mut exec = OnboardExecutive::new();
    install_services(&mut exec, &hardware.drivers()).unwrap();
    exec.apply_config(&default_config()).unwrap();
    exec.start().unwrap();

    for _ in 0..INITIAL_CYCLE_LENGTH {
        exec.tick().unwrap();
    }
    exec.dispatch(&CommandPacket::bare(CMD_NOP), CommandSource::Ground);

    let frame = exec.telemetry_frame();
    assert_eq!(frame.sequence_number, 1);
    assert_eq!(frame.mode, Some(MODE_INITIAL));
    assert_eq!(frame.cycles_completed, 1);
    assert_eq!(frame.apps.len(), APP_NAMES.len());
    assert_eq!(frame.dispatch.received, 2);

    let inits = frame
        .events
        .iter()
        .filter(|event| matches!(event, ExecEvent::AppInitialized { error: None, .. }))
        .count();
    assert_eq!(inits, APP_NAMES.len());
    assert!(frame
        .events
        .iter()
        .any(|event| matches!(event, ExecEvent::TaskListLoaded { mode: Some(MODE_INITIAL), .. })));
    assert!(matches!(
        frame.events.last(),
        Some(ExecEvent::CommandExecuted {
            source: CommandSource::Ground,
            ..
        })
    ));
    assert!(exec.recorder().is_empty());

    let json = frame.to_json().unwrap();
    assert!(json.contains(r#""event":"block_fired""#));

    let next = exec.telemetry_frame();
    assert_eq!(next.sequence_number, 2);
    assert!(next.events.is_empty());
}

#[test]
fn test_init_failure_is_reported_not_fatal() {
    let mut exec = OnboardExecutive::new();
    exec.register_app(Box::new(FnApp::new("camera", || Err(AppError::Driver { code: -1 }), || Ok(()))))
        .unwrap();
    exec.register_app(Box::new(FnApp::new("heater", || Ok(()), || Ok(()))))
        .unwrap();

    let summary = exec.start().unwrap();
    assert_eq!(summary.initialized, 1);
    assert_eq!(summary.failed.len(), 1);
    assert!(exec.is_started());

    let failed: Vec<AppId> = exec
        .recorder()
        .events()
        .filter_map(|event| match event {
            ExecEvent::AppInitialized { app, error: Some(_) } => Some(*app),
            _ => None,
        })
        .collect();
    assert_eq!(failed, [AppId(0)]);
}
