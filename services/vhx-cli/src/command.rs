//! Command-line parsing

use anyhow::{Context, Result, bail};
use serde_json::Value;

pub const USAGE: &str = "\
usage: vhx [--config PATH] <command>

commands:
  get PATH           GET a resource and print the JSON response
  delete PATH        DELETE a resource
  post PATH JSON     POST a JSON body
  put PATH JSON      PUT a JSON body
  whoami             GET /me
  refresh            exchange the refresh token and print the new credential
  credentials        print the active token fields";

#[derive(Debug, PartialEq)]
pub enum Command {
    Get { path: String },
    Delete { path: String },
    Post { path: String, body: Value },
    Put { path: String, body: Value },
    Whoami,
    Refresh,
    Credentials,
}

#[derive(Debug, PartialEq)]
pub struct Invocation {
    pub config_path: Option<String>,
    pub command: Command,
}

/// Parse arguments (without the program name).
pub fn parse(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let Some(path) = iter.next() else {
                bail!("--config requires a path\n\n{USAGE}");
            };
            config_path = Some(path.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        ["get", path] => Command::Get {
            path: path.to_string(),
        },
        ["delete", path] => Command::Delete {
            path: path.to_string(),
        },
        ["post", path, body] => Command::Post {
            path: path.to_string(),
            body: parse_body(body)?,
        },
        ["put", path, body] => Command::Put {
            path: path.to_string(),
            body: parse_body(body)?,
        },
        ["whoami"] => Command::Whoami,
        ["refresh"] => Command::Refresh,
        ["credentials"] => Command::Credentials,
        [] => bail!("missing command\n\n{USAGE}"),
        other => bail!("unrecognized arguments: {}\n\n{USAGE}", other.join(" ")),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("request body must be valid JSON")
}
