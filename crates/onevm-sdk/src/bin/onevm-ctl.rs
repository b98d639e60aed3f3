// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OpenNebula VM Control CLI
//!
//! CLI tool for managing virtual machines on an OpenNebula front-end.
//!
//! Usage:
//!   onevm-ctl <command> [options]
//!
//! Commands:
//!   info <vm_id> [--root <name>]  Print flattened attributes
//!   status <vm_id>                Print instance info as JSON
//!   create --template <id> --permissions <ooo> [--name <name>] [--attr K=V]...
//!   chmod <vm_id> <ooo>
//!   update <vm_id> --attr K=V...
//!   delete <vm_id>
//!   wait <vm_id> [--attribute <path>]

use std::io;
use std::process::ExitCode;

use onevm_sdk::{
    DeclaredAttributes, InstanceController, InstanceSpec, InstanceUpdate, OneClient,
    Permissions, ReadOptions, VM_ELEMENT_NAME,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!(
        r#"Usage: onevm-ctl <command> [options]

Manage OpenNebula virtual machines.

COMMANDS:
    info <vm_id>                    Print flattened attributes (key=value)
    status <vm_id>                  Print instance info as JSON
    create                          Instantiate a template and wait until running
    chmod <vm_id> <ooo>             Change permissions
    update <vm_id>                  Merge user attributes
    delete <vm_id>                  Terminate and wait until done
    wait <vm_id>                    Wait until running (or for an attribute)

INFO OPTIONS:
    --root <name>                   Root element to flatten (default: VM)

CREATE OPTIONS:
    --template <id>                 Template ID (required)
    --permissions <ooo>             Permissions, e.g. 640 (required)
    --name <name>                   Instance name
    --wait-for-attribute <path>     Wait for an attribute after boot
    --ip-attribute <path>           Attribute holding the IP
    --attr <key=value>              User attribute (repeatable)

UPDATE OPTIONS:
    --attr <key=value>              User attribute (repeatable, at least one)

WAIT OPTIONS:
    --attribute <path>              Wait for this attribute instead of RUNNING

ENVIRONMENT:
    OPENNEBULA_ENDPOINT             XML-RPC endpoint (default: http://localhost:2633/RPC2)
    OPENNEBULA_USERNAME             User name (required)
    OPENNEBULA_PASSWORD             Password (required)
    OPENNEBULA_WAIT_TIMEOUT_SECS    State wait timeout (default: 600)
    RUST_LOG                        Log filter (default: warn)

EXAMPLES:
    # Create a VM from template 4
    onevm-ctl create --template 4 --permissions 640 --name web --attr ROLE=web

    # Show the IP of VM 12
    onevm-ctl info 12 | grep ETH0_IP

    # Terminate VM 12
    onevm-ctl delete 12
"#
    );
}

#[derive(Debug)]
enum Command {
    Help,
    Info {
        vm_id: i64,
        root: String,
    },
    Status {
        vm_id: i64,
    },
    Create {
        template_id: i64,
        permissions: String,
        name: Option<String>,
        wait_for_attribute: Option<String>,
        ip_attribute: Option<String>,
        attributes: DeclaredAttributes,
    },
    Chmod {
        vm_id: i64,
        permissions: String,
    },
    Update {
        vm_id: i64,
        attributes: DeclaredAttributes,
    },
    Delete {
        vm_id: i64,
    },
    Wait {
        vm_id: i64,
        attribute: Option<String>,
    },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_id(value: Option<&String>, what: &str) -> Result<i64, String> {
    value
        .ok_or_else(|| format!("{} required", what))?
        .parse()
        .map_err(|_| format!("Invalid {}", what))
}

fn parse_attr(value: Option<&String>) -> Result<(String, Value), String> {
    let pair = value.ok_or("--attr requires key=value")?;
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => {
            Ok((key.to_string(), Value::String(value.to_string())))
        }
        _ => Err(format!("Invalid attribute: {}", pair)),
    }
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "info" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            let mut root = VM_ELEMENT_NAME.to_string();

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--root" => {
                        i += 1;
                        root = args.get(i).ok_or("--root requires a name")?.clone();
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Info { vm_id, root })
        }
        "status" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            Ok(Command::Status { vm_id })
        }
        "create" => {
            let mut template_id: Option<i64> = None;
            let mut permissions: Option<String> = None;
            let mut name: Option<String> = None;
            let mut wait_for_attribute: Option<String> = None;
            let mut ip_attribute: Option<String> = None;
            let mut attributes = DeclaredAttributes::new();

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--template" => {
                        i += 1;
                        template_id = Some(parse_id(args.get(i), "template ID")?);
                    }
                    "--permissions" => {
                        i += 1;
                        permissions =
                            Some(args.get(i).ok_or("--permissions requires a value")?.clone());
                    }
                    "--name" => {
                        i += 1;
                        name = Some(args.get(i).ok_or("--name requires a value")?.clone());
                    }
                    "--wait-for-attribute" => {
                        i += 1;
                        wait_for_attribute = Some(
                            args.get(i)
                                .ok_or("--wait-for-attribute requires a path")?
                                .clone(),
                        );
                    }
                    "--ip-attribute" => {
                        i += 1;
                        ip_attribute =
                            Some(args.get(i).ok_or("--ip-attribute requires a path")?.clone());
                    }
                    "--attr" => {
                        i += 1;
                        let (key, value) = parse_attr(args.get(i))?;
                        attributes.insert(key, value);
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Create {
                template_id: template_id.ok_or("--template is required")?,
                permissions: permissions.ok_or("--permissions is required")?,
                name,
                wait_for_attribute,
                ip_attribute,
                attributes,
            })
        }
        "chmod" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            let permissions = args.get(3).ok_or("Permissions required")?.clone();
            Ok(Command::Chmod { vm_id, permissions })
        }
        "update" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            let mut attributes = DeclaredAttributes::new();

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--attr" => {
                        i += 1;
                        let (key, value) = parse_attr(args.get(i))?;
                        attributes.insert(key, value);
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            if attributes.is_empty() {
                return Err("At least one --attr is required".to_string());
            }

            Ok(Command::Update { vm_id, attributes })
        }
        "delete" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            Ok(Command::Delete { vm_id })
        }
        "wait" => {
            let vm_id = parse_id(args.get(2), "VM ID")?;
            let mut attribute: Option<String> = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--attribute" => {
                        i += 1;
                        attribute = Some(args.get(i).ok_or("--attribute requires a path")?.clone());
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Wait { vm_id, attribute })
        }
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let cmd = match parse_args() {
        Ok(Command::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    // Create controller from environment
    let controller = match InstanceController::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match execute_command(&controller, cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute_command(controller: &InstanceController<OneClient>, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Help => print_usage(),

        Command::Info { vm_id, root } => {
            let attributes = controller
                .load_attributes(vm_id, &root)
                .map_err(|e| e.to_string())?;
            for (key, value) in &attributes {
                println!("{}={}", key, value);
            }
        }

        Command::Status { vm_id } => {
            let info = controller
                .read(vm_id, &ReadOptions::new())
                .map_err(|e| e.to_string())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?
            );
        }

        Command::Create {
            template_id,
            permissions,
            name,
            wait_for_attribute,
            ip_attribute,
            attributes,
        } => {
            let mut spec = InstanceSpec::new(template_id, permissions);
            if let Some(name) = name {
                spec = spec.with_name(name);
            }
            if let Some(attribute) = wait_for_attribute {
                spec = spec.with_wait_for_attribute(attribute);
            }
            if let Some(attribute) = ip_attribute {
                spec = spec.with_ip_attribute(attribute);
            }
            spec.attributes = attributes;

            let info = controller.create(&spec).map_err(|e| e.to_string())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?
            );
        }

        Command::Chmod { vm_id, permissions } => {
            let permissions: Permissions = permissions.parse().map_err(|e| format!("{}", e))?;
            controller
                .chmod(vm_id, &permissions)
                .map_err(|e| e.to_string())?;
            println!("Permissions of {} set to {}", vm_id, permissions);
        }

        Command::Update { vm_id, attributes } => {
            let update = InstanceUpdate::new().with_attributes(attributes);
            controller
                .update(vm_id, &update)
                .map_err(|e| e.to_string())?;
            println!("Updated: {}", vm_id);
        }

        Command::Delete { vm_id } => {
            controller.delete(vm_id).map_err(|e| e.to_string())?;
            println!("Terminated: {}", vm_id);
        }

        Command::Wait { vm_id, attribute } => match attribute {
            Some(path) => {
                let value = controller
                    .wait_for_attribute(vm_id, &path)
                    .map_err(|e| e.to_string())?;
                println!("{}={}", path, value);
            }
            None => {
                let status = controller
                    .wait_for_running(vm_id)
                    .map_err(|e| e.to_string())?;
                println!("{}", status);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to create args vector from string slice
    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    // ==========================================================================
    // Basic parsing
    // ==========================================================================

    #[test]
    fn test_no_command() {
        let result = parse_args_from_vec(&args(&["onevm-ctl"]));
        assert_eq!(result.unwrap_err(), "No command specified");
    }

    #[test]
    fn test_unknown_command() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "reboot"]));
        assert_eq!(result.unwrap_err(), "Unknown command: reboot");
    }

    #[test]
    fn test_help() {
        for flag in ["help", "--help", "-h"] {
            let cmd = parse_args_from_vec(&args(&["onevm-ctl", flag])).unwrap();
            assert!(matches!(cmd, Command::Help));
        }
    }

    // ==========================================================================
    // info / status
    // ==========================================================================

    #[test]
    fn test_info_default_root() {
        let cmd = parse_args_from_vec(&args(&["onevm-ctl", "info", "12"])).unwrap();
        match cmd {
            Command::Info { vm_id, root } => {
                assert_eq!(vm_id, 12);
                assert_eq!(root, "VM");
            }
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_info_custom_root() {
        let cmd =
            parse_args_from_vec(&args(&["onevm-ctl", "info", "12", "--root", "TEMPLATE"])).unwrap();
        assert!(matches!(cmd, Command::Info { root, .. } if root == "TEMPLATE"));
    }

    #[test]
    fn test_info_missing_id() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "info"]));
        assert_eq!(result.unwrap_err(), "VM ID required");
    }

    #[test]
    fn test_status_invalid_id() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "status", "abc"]));
        assert_eq!(result.unwrap_err(), "Invalid VM ID");
    }

    // ==========================================================================
    // create
    // ==========================================================================

    #[test]
    fn test_create_all_options() {
        let cmd = parse_args_from_vec(&args(&[
            "onevm-ctl",
            "create",
            "--template",
            "4",
            "--permissions",
            "640",
            "--name",
            "web",
            "--wait-for-attribute",
            "TEMPLATE/CONTEXT/ETH0_IP",
            "--ip-attribute",
            "TEMPLATE/NIC/IP",
            "--attr",
            "ROLE=web",
            "--attr",
            "EXTRA=a=b",
        ]))
        .unwrap();

        match cmd {
            Command::Create {
                template_id,
                permissions,
                name,
                wait_for_attribute,
                ip_attribute,
                attributes,
            } => {
                assert_eq!(template_id, 4);
                assert_eq!(permissions, "640");
                assert_eq!(name.as_deref(), Some("web"));
                assert_eq!(
                    wait_for_attribute.as_deref(),
                    Some("TEMPLATE/CONTEXT/ETH0_IP")
                );
                assert_eq!(ip_attribute.as_deref(), Some("TEMPLATE/NIC/IP"));
                assert_eq!(attributes["ROLE"], Value::String("web".to_string()));
                assert_eq!(attributes["EXTRA"], Value::String("a=b".to_string()));
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn test_create_missing_template() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "create", "--permissions", "640"]));
        assert_eq!(result.unwrap_err(), "--template is required");
    }

    #[test]
    fn test_create_missing_permissions() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "create", "--template", "4"]));
        assert_eq!(result.unwrap_err(), "--permissions is required");
    }

    #[test]
    fn test_create_invalid_attr() {
        let result = parse_args_from_vec(&args(&[
            "onevm-ctl",
            "create",
            "--template",
            "4",
            "--attr",
            "=value",
        ]));
        assert_eq!(result.unwrap_err(), "Invalid attribute: =value");
    }

    #[test]
    fn test_create_unknown_argument() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "create", "--image", "4"]));
        assert_eq!(result.unwrap_err(), "Unknown argument: --image");
    }

    // ==========================================================================
    // chmod / update / delete / wait
    // ==========================================================================

    #[test]
    fn test_chmod() {
        let cmd = parse_args_from_vec(&args(&["onevm-ctl", "chmod", "7", "600"])).unwrap();
        assert!(matches!(cmd, Command::Chmod { vm_id: 7, permissions } if permissions == "600"));
    }

    #[test]
    fn test_chmod_missing_permissions() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "chmod", "7"]));
        assert_eq!(result.unwrap_err(), "Permissions required");
    }

    #[test]
    fn test_update_requires_attr() {
        let result = parse_args_from_vec(&args(&["onevm-ctl", "update", "7"]));
        assert_eq!(result.unwrap_err(), "At least one --attr is required");
    }

    #[test]
    fn test_update() {
        let cmd = parse_args_from_vec(&args(&[
            "onevm-ctl", "update", "7", "--attr", "A=1", "--attr", "B=",
        ]))
        .unwrap();
        match cmd {
            Command::Update { vm_id, attributes } => {
                assert_eq!(vm_id, 7);
                assert_eq!(attributes.len(), 2);
                assert_eq!(attributes["B"], Value::String(String::new()));
            }
            _ => panic!("Expected Update command"),
        }
    }

    #[test]
    fn test_delete() {
        let cmd = parse_args_from_vec(&args(&["onevm-ctl", "delete", "99"])).unwrap();
        assert!(matches!(cmd, Command::Delete { vm_id: 99 }));
    }

    #[test]
    fn test_wait_for_running() {
        let cmd = parse_args_from_vec(&args(&["onevm-ctl", "wait", "5"])).unwrap();
        assert!(matches!(cmd, Command::Wait { vm_id: 5, attribute: None }));
    }

    #[test]
    fn test_wait_for_attribute() {
        let cmd = parse_args_from_vec(&args(&[
            "onevm-ctl",
            "wait",
            "5",
            "--attribute",
            "TEMPLATE/CONTEXT/ETH0_IP",
        ]))
        .unwrap();
        assert!(matches!(
            cmd,
            Command::Wait { attribute: Some(path), .. } if path == "TEMPLATE/CONTEXT/ETH0_IP"
        ));
    }
}
