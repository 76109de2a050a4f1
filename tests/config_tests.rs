use satcore::config::{BlockConfig, EntryConfig, ModeConfig};
use satcore::services::{install_services, SimHardware};
use satcore::settings::*;
use satcore::telemetry::ExecEvent;
use satcore::*;

const SAFE_MODE: &str = r#"{
    "modes": [
        { "id": 2, "name": "safe", "cycle_length": 10,
          "entries": [ { "offset": 0, "block": 35 }, { "offset": 5, "block": 17 } ] }
    ],
    "initial_mode": 2
}"#;

fn services_executive() -> (OnboardExecutive, SimHardware) {
    let hardware = SimHardware::new();
    let mut exec = OnboardExecutive::new();
    install_services(&mut exec, &hardware.drivers()).unwrap();
    (exec, hardware)
}

#[test]
fn test_rejected_document_changes_nothing() {
    let (mut exec, _) = services_executive();
    exec.apply_config(&default_config()).unwrap();
    exec.start().unwrap();
    for _ in 0..12 {
        exec.tick().unwrap();
    }

    // Second mode is fine, the third references an undefined block.
    let mut config = ExecutiveConfig::from_json(SAFE_MODE).unwrap();
    config.modes.push(ModeConfig {
        id: ModeId(3),
        name: None,
        cycle_length: 10,
        entries: vec![EntryConfig {
            offset: 1,
            block: BlockId(60),
        }],
    });

    let result = exec.apply_config(&config);
    assert_eq!(result, Err(ExecutiveError::Config(ConfigError::UnknownBlock(BlockId(60)))));

    let modes: Vec<ModeId> = exec.mode_ids().collect();
    assert_eq!(modes, [MODE_INITIAL]);
    assert_eq!(exec.scheduler().active_mode(), Some(MODE_INITIAL));
    assert_eq!(exec.scheduler().current_tick(), 12);

    let rejected = exec
        .recorder()
        .events()
        .filter(|event| matches!(event, ExecEvent::ConfigRejected { .. }))
        .count();
    assert_eq!(rejected, 1);
}

#[test]
fn test_mode_change_after_start() {
    let (mut exec, _) = services_executive();
    exec.apply_config(&default_config()).unwrap();
    exec.start().unwrap();
    for _ in 0..40 {
        exec.tick().unwrap();
    }

    exec.apply_config(&ExecutiveConfig::from_json(SAFE_MODE).unwrap())
        .unwrap();
    assert_eq!(exec.scheduler().active_mode(), Some(ModeId(2)));
    assert_eq!(exec.scheduler().current_tick(), 0);
    assert_eq!(exec.scheduler().active_task_list().map(TaskList::cycle_length), Some(10));

    exec.enter_mode(MODE_INITIAL).unwrap();
    assert_eq!(exec.scheduler().active_mode(), Some(MODE_INITIAL));
    assert_eq!(exec.enter_mode(ModeId(9)), Err(ConfigError::UnknownMode(ModeId(9))));
    assert_eq!(exec.scheduler().active_mode(), Some(MODE_INITIAL));
}

#[test]
fn test_blocks_frozen_after_start() {
    let (mut exec, _) = services_executive();
    exec.start().unwrap();

    let config = ExecutiveConfig {
        blocks: vec![BlockConfig::Single {
            id: BlockId(50),
            app: "update_gpio".into(),
        }],
        ..ExecutiveConfig::default()
    };
    assert_eq!(
        exec.apply_config(&config),
        Err(ExecutiveError::Registration(RegistrationError::Frozen))
    );
    assert!(!exec.blocks().contains(BlockId(50)));
}

#[test]
fn test_unknown_app_name_rejects_whole_document() {
    let (mut exec, _) = services_executive();
    let mut config = default_config();
    config.blocks.push(BlockConfig::Combiner {
        id: BlockId(70),
        apps: vec!["update_adc".into(), "update_star_tracker".into()],
    });

    assert_eq!(
        exec.apply_config(&config),
        Err(ExecutiveError::Config(ConfigError::UnknownAppName("update_star_tracker".into())))
    );
    assert!(exec.blocks().is_empty());
    assert_eq!(exec.mode_ids().count(), 0);
}

#[test]
fn test_config_file_shape() {
    let json = default_config().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["tick_period_ms"], 10);
    assert_eq!(value["init_policy"], "tolerant");
    assert_eq!(value["blocks"][0]["kind"], "combiner");
    assert_eq!(value["blocks"][0]["apps"][0], "tlm_mem_dump");
    assert_eq!(value["blocks"][2]["kind"], "single");
    assert_eq!(value["blocks"][2]["app"], "update_adc");
    assert_eq!(value["modes"][0]["entries"].as_array().map(Vec::len), Some(8));
    assert_eq!(value["modes"][0]["entries"][7]["offset"], 85);
    assert_eq!(value["initial_mode"], 1);
}

#[test]
fn test_mode_only_document_keeps_init_policy() {
    let (mut exec, _) = services_executive();
    let mut config = default_config();
    config.init_policy = Some(InitPolicy::SkipUpdates);
    exec.apply_config(&config).unwrap();
    exec.start().unwrap();

    let mode_only = ExecutiveConfig::from_json(SAFE_MODE).unwrap();
    assert_eq!(mode_only.init_policy, None);
    exec.apply_config(&mode_only).unwrap();

    assert_eq!(exec.apps().policy(), InitPolicy::SkipUpdates);
    assert_eq!(exec.scheduler().active_mode(), Some(ModeId(2)));

    exec.apply_config(&ExecutiveConfig::from_json(r#"{ "init_policy": "tolerant" }"#).unwrap())
        .unwrap();
    assert_eq!(exec.apps().policy(), InitPolicy::Tolerant);
}

#[test]
fn test_mode_names_come_from_document() {
    let (mut exec, _) = services_executive();
    exec.apply_config(&default_config()).unwrap();
    exec.apply_config(&ExecutiveConfig::from_json(SAFE_MODE).unwrap())
        .unwrap();

    assert_eq!(exec.mode_name(MODE_INITIAL), Some("initial"));
    assert_eq!(exec.mode_name(ModeId(2)), Some("safe"));
    assert_eq!(exec.mode_name(ModeId(9)), None);
}
