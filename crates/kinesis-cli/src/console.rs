//! Operator console – one command per line on stdin.
//!
//! Supported commands:
//!   move <motor> <position> [speed]  – move a motor (speed defaults to 0)
//!   stop                             – hold every motor where it is
//!   pattern <name>                   – replay a registered pattern
//!   status                           – print system status
//!   warnings                         – list safety warnings
//!   reset                            – reset the safety level to normal
//!   estop                            – emergency stop
//!   help                             – show this list
//!   quit | exit                      – shut down

use colored::Colorize;
use kinesis_runtime::{Intent, IntentOutcome, Orchestrator, SystemStatus};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    Warnings,
    Reset,
    Help,
    Quit,
}

/// Parse one console line.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("move", [motor, position]) => Command::Intent(Intent::Move {
            motor_id: motor.to_string(),
            position: number(position)?,
            speed: 0.0,
        }),
        ("move", [motor, position, speed]) => Command::Intent(Intent::Move {
            motor_id: motor.to_string(),
            position: number(position)?,
            speed: number(speed)?,
        }),
        ("move", _) => return Err("usage: move <motor> <position> [speed]".to_string()),
        ("stop", []) => Command::Intent(Intent::Stop),
        ("pattern", [name]) => Command::Intent(Intent::RunPattern {
            name: name.to_string(),
        }),
        ("pattern", _) => return Err("usage: pattern <name>".to_string()),
        ("status", []) => Command::Intent(Intent::Status),
        ("estop", []) => Command::Intent(Intent::EmergencyStop),
        ("warnings", []) => Command::Warnings,
        ("reset", []) => Command::Reset,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn number(word: &str) -> Result<f64, String> {
    word.parse::<f64>()
        .map_err(|_| format!("'{word}' is not a number"))
}

/// Execute `command`.  Returns `false` when the console should stop.
pub async fn execute(orch: &Orchestrator, command: Command) -> bool {
    match command {
        Command::Intent(intent) => match orch.handle_intent(intent).await {
            Ok(IntentOutcome::Status(status)) => print_status(&status),
            Ok(outcome) => println!("  {} {:?}", "✓".green().bold(), outcome),
            Err(e) => println!("  {} {}", "✗".red().bold(), e),
        },
        Command::Warnings => {
            let warnings = orch.safety().warnings();
            if warnings.is_empty() {
                println!("  {}", "no warnings".dimmed());
            }
            for (i, w) in warnings.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, w);
            }
        }
        Command::Reset => {
            orch.safety().reset();
            println!("  {} safety level reset", "✓".green().bold());
        }
        Command::Help => print_help(),
        Command::Quit => return false,
    }
    true
}

pub fn print_status(status: &SystemStatus) {
    println!();
    println!(
        "  safety {}  behavior {}  warnings {}  uptime {}s",
        status.safety_level.to_string().bold(),
        status.behavior.to_string().bold(),
        status.warnings,
        status.uptime.as_secs()
    );
    if !status.stalled.is_empty() {
        println!("  {} {}", "stalled:".yellow().bold(), status.stalled.join(", "));
    }
    for m in &status.motors {
        let state = if m.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        println!(
            "    {:<10} pos {:>7.2}  speed {:>7.2}  [{:.0}, {:.0}]  {}",
            m.id, m.position, m.speed, m.min_position, m.max_position, state
        );
    }
    println!();
}

pub fn print_help() {
    println!();
    println!("{}", "Kinesis Commands".bold().underline());
    println!("  {}  – move a motor", "move <motor> <pos> [speed]".bold().cyan());
    println!("  {}                        – hold every motor", "stop".bold().cyan());
    println!("  {}              – replay a pattern", "pattern <name>".bold().cyan());
    println!("  {}                      – system status", "status".bold().cyan());
    println!("  {}                    – list safety warnings", "warnings".bold().cyan());
    println!("  {}                       – reset safety level", "reset".bold().cyan());
    println!("  {}                       – emergency stop", "estop".bold().cyan());
    println!("  {}                 – shut down", "quit  exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_with_and_without_speed() {
        assert_eq!(
            parse("move servo_1 90").unwrap(),
            Command::Intent(Intent::Move {
                motor_id: "servo_1".into(),
                position: 90.0,
                speed: 0.0
            })
        );
        assert_eq!(
            parse("  MOVE servo_2 45.5 -30 ").unwrap(),
            Command::Intent(Intent::Move {
                motor_id: "servo_2".into(),
                position: 45.5,
                speed: -30.0
            })
        );
    }

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(parse("stop").unwrap(), Command::Intent(Intent::Stop));
        assert_eq!(parse("status").unwrap(), Command::Intent(Intent::Status));
        assert_eq!(parse("estop").unwrap(), Command::Intent(Intent::EmergencyStop));
        assert_eq!(
            parse("pattern sweep").unwrap(),
            Command::Intent(Intent::RunPattern {
                name: "sweep".into()
            })
        );
        assert_eq!(parse("warnings").unwrap(), Command::Warnings);
        assert_eq!(parse("reset").unwrap(), Command::Reset);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("").is_err());
        assert!(parse("move servo_1").is_err());
        assert!(parse("move servo_1 ninety").is_err());
        assert!(parse("pattern").is_err());
        assert!(parse("dance").unwrap_err().contains("dance"));
    }

    #[tokio::test]
    async fn quit_stops_the_console() {
        let orch = Orchestrator::new(Default::default());
        assert!(execute(&orch, Command::Reset).await);
        assert!(!execute(&orch, Command::Quit).await);
        orch.shutdown().await;
    }
}
