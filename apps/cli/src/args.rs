use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status { json: bool },
    Candidates { workflow: String, hint: Option<String> },
    ResetSpend { model: Option<String> },
    ResetLatency { model: Option<String> },
    ClearCache,
    ClearInflight { cache_key: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub command: Command,
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

pub fn parse_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut config = None;
    let mut command_name = None;
    let mut positional = None;
    let mut workflow = None;
    let mut hint = None;
    let mut json = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--workflow" => {
                workflow = Some(
                    args.next()
                        .ok_or_else(|| "missing value for --workflow".to_string())?,
                );
            }
            "--hint" => {
                hint = Some(
                    args.next()
                        .ok_or_else(|| "missing value for --hint".to_string())?,
                );
            }
            "--json" => {
                json = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown argument: {arg}"));
            }
            _ if command_name.is_none() => command_name = Some(arg),
            _ if positional.is_none() => positional = Some(arg),
            _ => return Err(format!("unexpected argument: {arg}")),
        }
    }

    let command = match command_name.as_deref() {
        None | Some("status") => Command::Status { json },
        Some("candidates") => Command::Candidates {
            workflow: workflow.ok_or_else(|| "candidates requires --workflow".to_string())?,
            hint,
        },
        Some("reset-spend") => Command::ResetSpend { model: positional.take() },
        Some("reset-latency") => Command::ResetLatency { model: positional.take() },
        Some("clear-cache") => Command::ClearCache,
        Some("clear-inflight") => Command::ClearInflight {
            cache_key: positional.take(),
        },
        Some(other) => return Err(format!("unknown command: {other}")),
    };
    if let Some(extra) = positional {
        return Err(format!("unexpected argument: {extra}"));
    }

    Ok(CliArgs { config, command })
}

pub fn print_help() {
    println!(
        "LLM router ledger tool\n\n\
Usage:\n  llm-router [--config <path>] <command>\n\n\
Commands:\n  status [--json]                            Spend, latency and cache per model\n  candidates --workflow <name> [--hint <m>]  Eligible models in routing order\n  reset-spend [<model>]                      Clear recorded spend\n  reset-latency [<model>]                    Clear recorded latency\n  clear-cache                                Drop every cached generation\n  clear-inflight [<cache_key>]               Drop inflight coordination rows\n\n\
Options:\n  --config <path>  Router config (default: $LLM_ROUTER_CONFIG or ./llm-router.toml)\n  -h, --help       Show this help message\n"
    );
}
