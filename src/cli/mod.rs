mod commands;

use anyhow::Result;
use console::style;

use cadence::config::DEFAULT_CONFIG_FILE;
use cadence::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Orchestration")
        .command("run", "Start the cycle scheduler until Ctrl-C")
        .command("cycle", "Run a single cycle and print the system state")
        .print();

    GuideSection::new("Intensive mode")
        .command("pipeline <prompt>", "Run the role pipeline over a prompt")
        .print();

    GuideSection::new("Setup")
        .command("config", "Print the effective orchestrator configuration")
        .print();

    GuideSection::new("Flags")
        .command("--config PATH", "Config file (default: cadence.toml)")
        .command("--cycles N", "Pipeline cycles, overrides [pipeline].max_cycles")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("cadence").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandArgs {
    pub config_path: String,
    pub cycles: Option<usize>,
    pub prompt: String,
}

pub(crate) fn parse_command_args(args: &[String], start: usize) -> CommandArgs {
    let mut config_path = DEFAULT_CONFIG_FILE.to_string();
    let mut cycles = None;
    let mut prompt_words = Vec::new();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--cycles" | "-n" => {
                if i + 1 < args.len() {
                    cycles = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            word => {
                prompt_words.push(word.to_string());
                i += 1;
            }
        }
    }
    CommandArgs {
        config_path,
        cycles,
        prompt: prompt_words.join(" "),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    let parsed = parse_command_args(&args, 2);

    match cmd {
        "run" => commands::run(&parsed).await,
        "cycle" => commands::cycle(&parsed).await,
        "pipeline" => {
            if parsed.prompt.is_empty() {
                print_error("Error: a prompt is required for pipeline mode.");
                print_help();
                return Ok(());
            }
            commands::pipeline(&parsed).await
        }
        "config" => commands::config(&parsed).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}
