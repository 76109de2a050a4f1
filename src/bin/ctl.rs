use clap::{App, AppSettings, Arg, SubCommand};
use colored::*;
use satcore::settings;
use satcore::CommandId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const ACK_TIMEOUT_SECS: u64 = 5;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("satcore-ctl")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("Ground-side client for the satcore SILS runner")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("SILS host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("SILS port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("Send NOP and wait for its ack"))
        .subcommand(
            SubCommand::with_name("send")
                .about("Send a raw command")
                .arg(Arg::with_name("id").help("Command id (decimal or 0x hex)").required(true))
                .arg(Arg::with_name("params").help("Parameter bytes as hex, e.g. 0301")),
        )
        .subcommand(
            SubCommand::with_name("gpio-write")
                .about("Drive a GPIO output pin")
                .arg(Arg::with_name("pin").required(true))
                .arg(Arg::with_name("value").required(true).help("0 or 1")),
        )
        .subcommand(
            SubCommand::with_name("mem-dump")
                .about("Dump a memory range into telemetry")
                .arg(Arg::with_name("start").required(true).help("Start address"))
                .arg(Arg::with_name("size").required(true).help("Byte count")),
        )
        .subcommand(
            SubCommand::with_name("uart-reopen")
                .about("Reopen a UART channel")
                .arg(Arg::with_name("channel").required(true))
                .arg(Arg::with_name("baud").required(true)),
        )
        .subcommand(
            SubCommand::with_name("boot-bank")
                .about("Select the bank for the next boot")
                .arg(
                    Arg::with_name("bank")
                        .required(true)
                        .possible_values(&["0", "1", "2"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("Request a system reset")
                .arg(Arg::with_name("confirm").long("confirm").help("Required for safety")),
        )
        .subcommand(SubCommand::with_name("monitor").about("Stream telemetry frames"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("ping", _) => {
            let ack = send_command(host, port, settings::CMD_NOP, &[]).await?;
            print_ack("NOP", &ack, format);
        }
        ("send", Some(sub)) => {
            let id = CommandId(parse_narrow("command id", sub.value_of("id").unwrap_or_default())?);
            let params = parse_hex(sub.value_of("params").unwrap_or_default())?;
            let ack = send_command(host, port, id, &params).await?;
            print_ack(&format!("Command {}", id), &ack, format);
        }
        ("gpio-write", Some(sub)) => {
            let pin: u8 = parse_narrow("pin", sub.value_of("pin").unwrap_or_default())?;
            let value: u8 = parse_narrow("value", sub.value_of("value").unwrap_or_default())?;
            let ack = send_command(host, port, settings::CMD_GPIO_WRITE, &[pin, value]).await?;
            print_ack(&format!("GPIO pin {} <- {}", pin, value), &ack, format);
        }
        ("mem-dump", Some(sub)) => {
            let start = parse_number(sub.value_of("start").unwrap_or_default())?;
            let size = parse_number(sub.value_of("size").unwrap_or_default())?;
            let mut params = start.to_be_bytes().to_vec();
            params.extend_from_slice(&size.to_be_bytes());
            let ack = send_command(host, port, settings::CMD_APP_TMD_MEM_DUMP, &params).await?;
            print_ack(&format!("Memory dump 0x{:08X}+{}", start, size), &ack, format);
        }
        ("uart-reopen", Some(sub)) => {
            let channel: u8 = parse_narrow("channel", sub.value_of("channel").unwrap_or_default())?;
            let baud = parse_number(sub.value_of("baud").unwrap_or_default())?;
            let mut params = vec![channel];
            params.extend_from_slice(&baud.to_be_bytes());
            let ack = send_command(host, port, settings::CMD_UART_REOPEN, &params).await?;
            print_ack(&format!("UART {} @ {}", channel, baud), &ack, format);
        }
        ("boot-bank", Some(sub)) => {
            let bank = parse_number(sub.value_of("bank").unwrap_or_default())?;
            let ack = send_command(host, port, settings::CMD_BTMGR_SET_NEXT_BOOT_BANK, &bank.to_be_bytes()).await?;
            print_ack(&format!("Next boot bank {}", bank), &ack, format);
        }
        ("reset", Some(sub)) => {
            if sub.is_present("confirm") {
                let ack = send_command(host, port, settings::CMD_BTMGR_SYSTEM_RESET, &[]).await?;
                print_ack("System reset", &ack, format);
            } else {
                println!("{}", "Reset requires --confirm flag for safety".yellow());
            }
        }
        ("monitor", _) => monitor(host, port, format).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn parse_number(text: &str) -> CliResult<u32> {
    let cleaned = text.replace('_', "");
    let value = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => cleaned.parse()?,
    };
    Ok(value)
}

/// Parse a number and refuse values that do not fit the target field.
fn parse_narrow<T: TryFrom<u32>>(what: &str, text: &str) -> CliResult<T> {
    let value = parse_number(text)?;
    T::try_from(value).map_err(|_| format!("{} {} is out of range", what, value).into())
}

fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits = text.trim_start_matches("0x");
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not a hex string", text).into());
    }
    if digits.len() % 2 != 0 {
        return Err("hex parameters need an even number of digits".into());
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| -> CliResult<u8> { Ok(u8::from_str_radix(std::str::from_utf8(pair)?, 16)?) })
        .collect()
}

async fn send_command(host: &str, port: u16, id: CommandId, params: &[u8]) -> CliResult<serde_json::Value> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to SILS at {}", "x".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Start it with: {}", "!".yellow(), "satcore-sils".bright_cyan());
            }
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    let packet = serde_json::json!({ "id": id.0, "params": params });
    writer.write_all(packet.to_string().as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Telemetry frames share the connection; skip them until the ack arrives.
    let mut lines = BufReader::new(reader).lines();
    let wait_for_ack = async {
        while let Some(line) = lines.next_line().await? {
            let value: serde_json::Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if value.get("result").is_some() || value.get("error").is_some() {
                return Ok(value);
            }
        }
        Err::<serde_json::Value, Box<dyn std::error::Error>>("connection closed before ack".into())
    };

    match tokio::time::timeout(std::time::Duration::from_secs(ACK_TIMEOUT_SECS), wait_for_ack).await {
        Ok(result) => result,
        Err(_) => {
            eprintln!("{} No ack after {} seconds", "!".yellow(), ACK_TIMEOUT_SECS);
            Err("ack timeout".into())
        }
    }
}

fn print_ack(action: &str, ack: &serde_json::Value, format: &str) {
    match format {
        "json" => println!("{}", ack),
        "compact" => {
            let exec = ack["result"]["exec"].as_str().unwrap_or("Error");
            println!("{} {}", exec, ack["result"]["err_code"].as_i64().unwrap_or(0));
        }
        _ => {
            if let Some(error) = ack["error"].as_str() {
                println!("{} {} rejected: {}", "x".red(), action.bright_white(), error.bright_red());
                return;
            }

            let exec = ack["result"]["exec"].as_str().unwrap_or("Unknown");
            let err_code = ack["result"]["err_code"].as_i64().unwrap_or(0);
            let tick = ack["tick"].as_u64().unwrap_or(0);
            match (exec, err_code) {
                ("Success", 0) => {
                    println!("{} {} {}", "ok".green(), action.bright_white(), format!("(tick {})", tick).dimmed());
                }
                ("Success", code) => {
                    println!("{} {} ran, driver error {}", "!".yellow(), action.bright_white(), code.to_string().bright_red());
                }
                ("UnknownCommand", _) => {
                    println!("{} {} is not a registered command", "?".blue(), action.bright_white());
                }
                (status, _) => {
                    println!("{} {} failed: {}", "x".red(), action.bright_white(), status.bright_red());
                }
            }
        }
    }
}

async fn monitor(host: &str, port: u16, format: &str) -> CliResult<()> {
    println!("{}", "Monitoring telemetry (Ctrl+C to stop)...".bright_blue().bold());
    let stream = TcpStream::connect((host, port)).await?;
    let mut lines = BufReader::new(stream).lines();

    while let Some(line) = lines.next_line().await? {
        if format == "json" {
            println!("{}", line);
            continue;
        }
        let frame: serde_json::Value = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        print_frame(&frame, format);
    }

    Ok(())
}

fn print_frame(frame: &serde_json::Value, format: &str) {
    let seq = frame["sequence_number"].as_u64().unwrap_or(0);
    let cycles = frame["cycles_completed"].as_u64().unwrap_or(0);
    let fired = frame["scheduler"]["blocks_fired"].as_u64().unwrap_or(0);
    let failures = frame["scheduler"]["block_failures"].as_u64().unwrap_or(0);
    let commands = frame["dispatch"]["received"].as_u64().unwrap_or(0);

    let failures_str = if failures == 0 {
        failures.to_string().green()
    } else {
        failures.to_string().red()
    };

    if format == "compact" {
        println!("#{} cycles={} fired={} failures={}", seq, cycles, fired, failures_str);
        return;
    }

    println!(
        "{} {:>6}  cycles {:>6}  blocks {:>8}  failures {}  commands {}",
        "frame".bright_blue(),
        seq,
        cycles,
        fired,
        failures_str,
        commands
    );

    if let Some(apps) = frame["apps"].as_array() {
        for app in apps {
            let name = app["name"].as_str().unwrap_or("?");
            let updates = app["stats"]["update_count"].as_u64().unwrap_or(0);
            let failed = app["stats"]["failure_count"].as_u64().unwrap_or(0);
            let marker = if failed == 0 { "  ".normal() } else { " !".yellow() };
            println!("   {}{:<20} updates {:>8}  failures {}", marker, name, updates, failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_accepts_hex_and_separators() {
        assert_eq!(parse_number("0x20").unwrap(), 0x20);
        assert_eq!(parse_number("115_200").unwrap(), 115_200);
        assert!(parse_number("-1").is_err());
    }

    #[test]
    fn test_narrow_fields_reject_out_of_range() {
        assert_eq!(parse_narrow::<u8>("pin", "255").unwrap(), 255);
        assert!(parse_narrow::<u8>("pin", "256").is_err());
        assert_eq!(parse_narrow::<u16>("command id", "0x0020").unwrap(), 0x20);
        let err = parse_narrow::<u16>("command id", "0x10020").unwrap_err();
        assert_eq!(err.to_string(), "command id 65568 is out of range");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0301").unwrap(), [0x03, 0x01]);
        assert_eq!(parse_hex("0xDEad").unwrap(), [0xDE, 0xAD]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("030").is_err());
        assert!(parse_hex("zz").is_err());
        // Multi-byte characters are an input error, never a slice panic.
        assert!(parse_hex("\u{20ac}a").is_err());
    }
}
