//! ScriptIt CLI - run untrusted scripts behind an allow-listed global scope

use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scriptit::cli::{Args, SubCommand};
use scriptit::script::{
    explain_script, has_errors, validate_script, ScriptRunner, ValidationOptions, ValidationSeverity,
};
use scriptit::{compile, format_output, Output, OutputFormat, SandboxConfig, ScriptingEnvironment};

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "scriptit=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SandboxConfig> {
    match path {
        Some(path) => SandboxConfig::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Ok(SandboxConfig::default()),
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Human };
    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        SubCommand::Run {
            file,
            args: script_args,
            profile,
            payload,
        } => {
            if let Some(profile) = profile {
                config = config.with_profile(profile);
            }
            if let Some(payload) = payload {
                config = config.with_payload(payload);
            }
            config.validate()?;

            // Validate before running; warnings never block
            let content = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let unit = compile(&content)?;
            let mut options = validation_options(&config);
            if !script_args.is_empty() {
                options.host_globals.push("args".to_string());
            }
            let issues = validate_script(unit.script(), &options);
            for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Warning) {
                eprintln!("Warning: {}", issue);
            }
            if has_errors(&issues) {
                for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Error) {
                    eprintln!("Error: {}", issue);
                }
                bail!("script validation failed");
            }

            let mut runner = ScriptRunner::new(config).with_args(script_args);
            let result = runner.run_file(&file)?;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "script failed".to_string()));
            }

            let output = result.value.map_or(Output::Empty, Output::Value);
            print_output(&output, &format);
            if args.verbose {
                eprintln!("--- Script completed: {} statements ---", result.statements);
            }
            Ok(())
        }

        SubCommand::Eval { expression, profile } => {
            if let Some(profile) = profile {
                config = config.with_profile(profile);
            }
            config.validate()?;
            let mut env = ScriptingEnvironment::with_config(config);
            let value = env.eval_expression(&expression)?;
            print_output(&Output::Value(value), &format);
            Ok(())
        }

        SubCommand::Check { file } => {
            config.validate()?;
            let content = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let unit = compile(&content)?;
            let issues = validate_script(unit.script(), &validation_options(&config));
            let passed = !has_errors(&issues);

            let output = Output::Check {
                path: file.display().to_string(),
                outline: explain_script(unit.script()),
                issues: issues.iter().map(ToString::to_string).collect(),
                passed,
            };
            print_output(&output, &format);
            if !passed {
                bail!("script validation failed");
            }
            Ok(())
        }

        SubCommand::Allowlist { profile } => {
            if let Some(profile) = profile {
                config = config.with_profile(profile);
            }
            let allow_list = config.allow_list();
            let output = Output::AllowList {
                profile: allow_list.profile(),
                names: allow_list.allowed_names().map(str::to_string).collect(),
            };
            print_output(&output, &format);
            Ok(())
        }

        #[cfg(feature = "repl")]
        SubCommand::Repl { container } => {
            config.validate()?;
            scriptit::repl::run_repl(config, container.as_deref())?;
            Ok(())
        }
        #[cfg(not(feature = "repl"))]
        SubCommand::Repl { .. } => {
            bail!("REPL support not enabled. Rebuild with --features repl")
        }
    }
}

fn validation_options(config: &SandboxConfig) -> ValidationOptions {
    ValidationOptions {
        allow_list: config.allow_list(),
        ..ValidationOptions::default()
    }
}

fn print_output(output: &Output, format: &OutputFormat) {
    let text = format_output(output, format);
    if !text.is_empty() {
        println!("{}", text);
    }
}
