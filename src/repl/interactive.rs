//! Interactive REPL implementation

use std::path::Path;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::SandboxConfig;
use crate::container::{ContainerManager, DEFAULT_CONTAINER};
use crate::error::{Result, ScriptError};
use crate::output::human::render;
use crate::security::Profile;

/// What a dot-command asks the loop to do next
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Exit,
}

pub fn run_repl(config: SandboxConfig, container: Option<&str>) -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| ScriptError::Runtime(e.to_string()))?;

    println!("ScriptIt v{} - Interactive Mode", env!("CARGO_PKG_VERSION"));
    println!("Type '.help' for commands, '.exit' to quit\n");

    let mut manager = ContainerManager::new(config);
    if let Some(name) = container {
        if !manager.exists(name) {
            manager.create(name)?;
        }
        manager.switch(name)?;
    }

    // Buffer for input spanning several lines (open brackets)
    let mut input_buffer = String::new();

    loop {
        let depth = bracket_depth(&input_buffer);
        let prompt = if depth > 0 {
            format!("{}...> ", "  ".repeat(depth))
        } else if manager.active_name() != DEFAULT_CONTAINER {
            format!("scriptit [{}]> ", manager.active_name())
        } else {
            "scriptit> ".to_string()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if input_buffer.is_empty() {
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('.') {
                        let _ = rl.add_history_entry(trimmed);
                        match handle_command(&mut manager, trimmed) {
                            Ok(Flow::Exit) => {
                                println!("Goodbye!");
                                break;
                            }
                            Ok(Flow::Continue) => {}
                            Err(e) => eprintln!("Error: {}\n", e),
                        }
                        continue;
                    }
                }

                let _ = rl.add_history_entry(trimmed);
                if !input_buffer.is_empty() {
                    input_buffer.push('\n');
                }
                input_buffer.push_str(&line);

                if bracket_depth(&input_buffer) > 0 {
                    continue;
                }

                let source = std::mem::take(&mut input_buffer);
                match evaluate(&mut manager, &source) {
                    Ok(text) => println!("{}\n", text),
                    Err(e) => eprintln!("Error: {}\n", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C - cancel current input
                if input_buffer.is_empty() {
                    println!("^C");
                } else {
                    println!("^C (input cancelled)");
                    input_buffer.clear();
                }
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Evaluate in the active environment and render the result
fn evaluate(manager: &mut ContainerManager, source: &str) -> Result<String> {
    let env = manager.active_mut()?;
    match env.eval_expression(source) {
        Ok(value) => Ok(render(&value)),
        // Functions have no host form; show them opaquely
        Err(ScriptError::Cast { from, .. }) => Ok(format!("[{}]", from)),
        Err(e) => Err(e),
    }
}

fn handle_command(manager: &mut ContainerManager, line: &str) -> Result<Flow> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [".exit"] | [".quit"] => return Ok(Flow::Exit),
        [".help"] => print_help(),
        [".globals"] => {
            let env = manager.active()?;
            for key in env.container_keys() {
                let shown = match env.get_global(&key) {
                    Ok(Some(value)) => render(&value),
                    Ok(None) => "undefined".to_string(),
                    Err(_) => "[unrepresentable]".to_string(),
                };
                println!("  {} = {}", key, shown);
            }
            println!();
        }
        [".profile"] => {
            let env = manager.active()?;
            println!("{} ({} payloads)\n", env.profile(), env.payload_profile());
        }
        [".container", "list"] | [".containers"] => {
            println!("Containers:");
            for name in manager.list() {
                let profile = manager.get(name).map(|env| env.profile().to_string()).unwrap_or_default();
                let active = if manager.active_name() == name { " (active)" } else { "" };
                println!("  {} - profile: {}{}", name, profile, active);
            }
            println!();
        }
        [".container", "create", name] => {
            manager.create(name)?;
            println!("Container '{}' created\n", name);
        }
        [".container", "create", name, profile] => {
            let profile = parse_profile(profile)?;
            let config = manager.active()?.config().clone().with_profile(profile);
            manager.create_with(name, config)?;
            println!("Container '{}' created with {} profile\n", name, profile);
        }
        [".container", "switch", name] => {
            manager.switch(name)?;
            println!("Switched to container '{}'\n", name);
        }
        [".container", "destroy", name] => {
            manager.destroy(name)?;
            println!("Container '{}' destroyed\n", name);
        }
        [".container", "export", name, path] => {
            manager.export(name, Path::new(path))?;
            println!("Container '{}' exported to '{}'\n", name, path);
        }
        _ => {
            return Err(ScriptError::Runtime(format!(
                "Unknown command '{}'. Type '.help' for commands",
                line
            )))
        }
    }
    Ok(Flow::Continue)
}

fn parse_profile(name: &str) -> Result<Profile> {
    match name {
        "broad" => Ok(Profile::Broad),
        "narrow" => Ok(Profile::Narrow),
        other => Err(ScriptError::Runtime(format!("Unknown profile '{}'", other))),
    }
}

/// Unclosed `(`, `[` and `{` outside string literals and comments
fn bracket_depth(source: &str) -> usize {
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => {
                // line comment
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

fn print_help() {
    println!(
        r#"
ScriptIt REPL
=============

Type any expression or statement; its completion value is printed.
Input with unclosed brackets continues on the next line.

Undeclared assignments (x = 1) persist in the active container;
let/const/var declarations last for one input only.

COMMANDS:
  .help                               - Show this help
  .globals                            - Show the active container's globals
  .profile                            - Show the active allow-list profile
  .containers                         - List all containers
  .container create <name> [profile]  - Create a container (broad|narrow)
  .container switch <name>            - Switch to a container
  .container destroy <name>           - Destroy a container
  .container export <name> <path>     - Export globals to a script file
  .exit                               - Exit REPL
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_depth() {
        assert_eq!(bracket_depth("function f() {"), 1);
        assert_eq!(bracket_depth("[1, [2"), 2);
        assert_eq!(bracket_depth("'{' + \"(\""), 0);
        assert_eq!(bracket_depth("f(1) // {"), 0);
        assert_eq!(bracket_depth("{ a: 1 }"), 0);
    }

    #[test]
    fn test_container_commands() {
        let mut manager = ContainerManager::default();
        handle_command(&mut manager, ".container create work broad").unwrap();
        handle_command(&mut manager, ".container switch work").unwrap();
        assert_eq!(manager.active_name(), "work");
        assert_eq!(manager.active().unwrap().profile(), Profile::Broad);

        handle_command(&mut manager, ".container destroy work").unwrap();
        assert_eq!(manager.active_name(), DEFAULT_CONTAINER);
        assert!(handle_command(&mut manager, ".container switch work").is_err());
        assert_eq!(handle_command(&mut manager, ".exit").unwrap(), Flow::Exit);
    }

    #[test]
    fn test_evaluate_persists_globals() {
        let mut manager = ContainerManager::default();
        evaluate(&mut manager, "total = 2").unwrap();
        assert_eq!(evaluate(&mut manager, "total * 21").unwrap(), "42");
        assert_eq!(evaluate(&mut manager, "() => 1").unwrap(), "[function]");
    }
}
