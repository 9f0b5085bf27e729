//! # OI4 Edge CLI
//!
//! Command-line utilities for DNP encoding and topic inspection.

use anyhow::{Context, Result};
use oi4_edge_core::{dnp, Oi4Identifier};
use oi4_edge_proto::Topic;
use serde_json::json;
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "encode" => {
            if args.len() < 3 {
                eprintln!("Usage: oi4-edge encode <text>");
                std::process::exit(1);
            }
            println!("{}", dnp::encode(&args[2]));
        }
        "decode" => {
            if args.len() < 3 {
                eprintln!("Usage: oi4-edge decode <encoded>");
                std::process::exit(1);
            }
            let decoded = dnp::decode(&args[2]).context("Failed to decode")?;
            println!("{decoded}");
        }
        "identifier" => {
            if args.len() < 3 {
                eprintln!("Usage: oi4-edge identifier <manufacturer/model/product/serial>");
                std::process::exit(1);
            }
            let id = Oi4Identifier::parse(&args[2], true).context("Failed to parse identifier")?;
            println!("{}", serde_json::to_string_pretty(&id)?);
        }
        "topic" => {
            if args.len() < 3 {
                eprintln!("Usage: oi4-edge topic <topic>");
                std::process::exit(1);
            }
            let topic = Topic::parse(&args[2]).context("Failed to parse topic")?;
            let fields = json!({
                "ServiceType": topic.service_type.to_string(),
                "Publisher": topic.publisher.to_plain_string(),
                "Method": topic.method.to_string(),
                "Resource": topic.resource.to_string(),
                "Source": topic.source.as_ref().map(Oi4Identifier::to_plain_string),
                "Category": topic.category,
                "Filter": topic.filter.as_ref().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"OI4 Edge CLI

USAGE:
    oi4-edge <COMMAND> [OPTIONS]

COMMANDS:
    encode <text>       DNP-encode an identifier part
    decode <encoded>    Decode a DNP-encoded identifier part
    identifier <id>     Parse a wire identifier and print its parts
    topic <topic>       Parse an OI4 topic and print its fields
    help                Show this help message

EXAMPLES:
    oi4-edge encode "FBC#123"
    oi4-edge decode "FBC,23123"
    oi4-edge topic "Oi4/OTConnector/acme.com/FBC/fbc,25183z/FBC,23123/Get/MAM"
"#
    );
}
