use std::cell::Cell;
use std::rc::Rc;

use satcore::command::CommandState;
use satcore::*;

fn echo(packet: &CommandPacket) -> CommandResult {
    CommandResult::with_code(packet.param_len() as i32)
}

#[test]
fn test_duplicate_command_id_rejected() {
    let mut exec = OnboardExecutive::new();
    exec.register_command(CommandId(1), echo).unwrap();

    let second = exec.register_command(CommandId(1), echo);
    assert_eq!(second, Err(RegistrationError::DuplicateId(CommandId(1))));

    let ids: Vec<CommandId> = exec.dispatcher().registry().ids().collect();
    assert_eq!(ids, [CommandId(1)]);
}

#[test]
fn test_unknown_command_is_acknowledged_not_fatal() {
    let mut exec = OnboardExecutive::new();
    exec.register_command(CommandId(1), echo).unwrap();
    exec.start().unwrap();

    let ack = exec.dispatch(&CommandPacket::bare(CommandId(0x1FF)), CommandSource::Ground);
    assert_eq!(ack.result, CommandResult::rejected(ExecStatus::UnknownCommand));
    assert!(ack.message.unwrap().contains("unknown command"));

    let record = exec.dispatcher().last_record().unwrap();
    assert_eq!(record.state, CommandState::Unknown);

    // The dispatcher keeps serving.
    let ack = exec.dispatch(&CommandPacket::new(CommandId(1), &[1, 2]).unwrap(), CommandSource::Ground);
    assert_eq!(ack.result, CommandResult::with_code(2));
    assert_eq!(exec.dispatcher().stats().unknown, 1);
    assert_eq!(exec.dispatcher().stats().received, 2);
}

#[test]
fn test_uplink_bytes_dispatch_as_ground_command() {
    let mut exec = OnboardExecutive::new();
    exec.register_command(CommandId(0x20), echo).unwrap();
    exec.start().unwrap();

    let ack = exec.receive_uplink(&[0x00, 0x20, 0x00, 0x02, 0x03, 0x01]).unwrap();
    assert_eq!(ack.id, CommandId(0x20));
    assert_eq!(ack.source, CommandSource::Ground);
    assert_eq!(ack.result, CommandResult::with_code(2));
    assert_eq!(ack.sequence, 1);

    assert_eq!(
        exec.receive_uplink(&[0x00, 0x20, 0x00, 0x04, 0x03]).unwrap_err(),
        ProtocolError::LengthMismatch { declared: 4, actual: 1 }
    );
    // A malformed frame never reaches the dispatcher.
    assert_eq!(exec.dispatcher().stats().received, 1);
}

#[test]
fn test_json_uplink_ack_round_trips() {
    let mut exec = OnboardExecutive::new();
    exec.register_command(CommandId(7), |_: &CommandPacket| CommandResult::rejected(ExecStatus::IllegalParameter))
        .unwrap();
    exec.start().unwrap();

    let ack = exec.receive_json(r#"{"id":7,"params":[9]}"#).unwrap();
    let json = ack.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["result"]["exec"], "IllegalParameter");
    assert_eq!(value["result"]["err_code"], 0);
    assert_eq!(value["message"], "IllegalParameter");

    assert_eq!(exec.receive_json("not json").unwrap_err(), ProtocolError::InvalidJson);
}

#[test]
fn test_command_block_dispatches_internally() {
    let mut exec = OnboardExecutive::new();
    exec.register_command(CommandId(3), echo).unwrap();
    exec.define_block(BlockId(5), Block::Command(CommandPacket::new(CommandId(3), &[0]).unwrap()))
        .unwrap();
    exec.define_block(BlockId(6), Block::Command(CommandPacket::bare(CommandId(3))))
        .unwrap();
    exec.start().unwrap();
    exec.load_task_list(TaskList::from_entries(2, &[(0, BlockId(5)), (1, BlockId(6))]).unwrap())
        .unwrap();

    // One parameter byte: the handler answers with driver code 1 and the block counts as failed.
    assert_eq!(exec.tick().unwrap().block_failures, 1);
    assert_eq!(exec.tick().unwrap().block_failures, 0);

    let sources: Vec<CommandSource> = exec.dispatcher().history().map(|r| r.source).collect();
    assert_eq!(sources, [CommandSource::Internal, CommandSource::Internal]);
    assert_eq!(exec.dispatcher().stats().driver_errors, 1);
    assert_eq!(exec.dispatcher().stats().succeeded, 1);
}

#[test]
fn test_start_refuses_command_block_without_handler() {
    let mut exec = OnboardExecutive::new();
    exec.register_app(Box::new(FnApp::new("a", || Ok(()), || Ok(()))))
        .unwrap();
    exec.register_command(CommandId(3), echo).unwrap();
    exec.define_block(BlockId(6), Block::Command(CommandPacket::bare(CommandId(4))))
        .unwrap();

    assert!(matches!(
        exec.start(),
        Err(ExecutiveError::Config(ConfigError::UnknownCommand {
            block: BlockId(6),
            command: CommandId(4),
        }))
    ));
    assert!(!exec.is_started());
    assert!(!exec.apps().stats(AppId(0)).unwrap().initialized);
    assert_eq!(exec.tick(), Err(ExecutiveError::NotStarted));
}

#[test]
fn test_unknown_id_runs_no_handler() {
    let calls = Rc::new(Cell::new(0u32));
    let mut exec = OnboardExecutive::new();
    let counter = Rc::clone(&calls);
    exec.register_command(CommandId(2), move |_: &CommandPacket| {
        counter.set(counter.get() + 1);
        CommandResult::success()
    })
    .unwrap();
    exec.start().unwrap();

    let ack = exec.dispatch(&CommandPacket::bare(CommandId(1)), CommandSource::Ground);
    assert_eq!(ack.result, CommandResult::rejected(ExecStatus::UnknownCommand));
    assert_eq!(calls.get(), 0);

    exec.dispatch(&CommandPacket::bare(CommandId(2)), CommandSource::Ground);
    assert_eq!(calls.get(), 1);
}
