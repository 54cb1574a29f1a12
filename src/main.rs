use std::path::PathBuf;
use tracing::info;

use serp_phantom::{fetch_result_page_markup, try_search, SearchOptions};

#[derive(Debug, Clone)]
struct Cli {
    query: String,
    opts: SearchOptions,
    get_html: bool,
    save_html: bool,
    html_output: Option<PathBuf>,
}

const USAGE: &str = "\
Usage: serp-phantom search <query> [options]

Options:
  --limit N          maximum number of results (default 10)
  --timeout MS       navigation timeout in milliseconds (default 60000)
  --state-file PATH  session-state file (default ~/.serp-phantom/state.json)
  --locale LOCALE    locale hint for a freshly generated identity (default en-US)
  --no-save-state    do not write session or identity state
  --get-html         return the sanitized results-page markup instead of records
  --save-html        also write the markup and a screenshot to disk
  --html-output PATH where to write the markup (implies --save-html)
";

// Flag scan accepting both `--flag value` and `--flag=value`.
fn take_value(
    iter: &mut std::slice::Iter<String>,
    flag: &str,
    inline: Option<&str>,
) -> Result<String, String> {
    if let Some(v) = inline {
        return Ok(v.to_string());
    }
    iter.next()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut iter = args.iter();

    match iter.next().map(String::as_str) {
        Some("search") => {}
        Some(other) => return Err(format!("unknown command: {}", other)),
        None => return Err("missing command".to_string()),
    }

    let mut query: Option<String> = None;
    let mut opts = SearchOptions::default();
    let mut get_html = false;
    let mut save_html = false;
    let mut html_output: Option<PathBuf> = None;

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) => (f, Some(v)),
            None => (arg.as_str(), None),
        };
        match flag {
            "--limit" => {
                let v = take_value(&mut iter, flag, inline)?;
                opts.limit = v
                    .parse::<usize>()
                    .map_err(|_| format!("invalid --limit: {}", v))?;
            }
            "--timeout" => {
                let v = take_value(&mut iter, flag, inline)?;
                opts.timeout_ms = v
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout: {}", v))?;
            }
            "--state-file" => {
                opts.state_file = PathBuf::from(take_value(&mut iter, flag, inline)?);
            }
            "--locale" => {
                opts.locale = take_value(&mut iter, flag, inline)?;
            }
            "--no-save-state" => opts.no_save_state = true,
            "--get-html" => get_html = true,
            "--save-html" => save_html = true,
            "--html-output" => {
                html_output = Some(PathBuf::from(take_value(&mut iter, flag, inline)?));
                save_html = true;
            }
            _ if flag.starts_with("--") => return Err(format!("unknown option: {}", flag)),
            _ => {
                if query.is_some() {
                    return Err(format!("unexpected argument: {}", arg));
                }
                query = Some(arg.to_string());
            }
        }
    }

    let query = query.ok_or_else(|| "missing query".to_string())?;
    Ok(Cli {
        query,
        opts,
        get_html,
        save_html,
        html_output,
    })
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    info!("serp-phantom: searching for '{}'", cli.query);

    if cli.get_html || cli.save_html {
        match fetch_result_page_markup(&cli.query, &cli.opts, cli.save_html, cli.html_output).await
        {
            Ok(resp) => match serde_json::to_string_pretty(&resp) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("error: failed to encode response: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match try_search(&cli.query, &cli.opts, None).await {
            Ok(resp) => match serde_json::to_string_pretty(&resp) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("error: failed to encode response: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
