use {
    anyhow::{Context, Result},
    strata_config::{Config, ConfigOptions, EnvVars, Error, FileSource, FormatRegistry, Value},
    tracing::debug,
};

use crate::LayerArgs;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Split a `KEY[=DEFAULT]` argument.
fn parse_key_arg(arg: &str) -> (&str, Option<Value>) {
    match arg.split_once('=') {
        Some((key, default)) => (key, Some(Value::from(default))),
        None => (arg, None),
    }
}

fn load_options(layers: &LayerArgs) -> Result<ConfigOptions> {
    let mut options = match &layers.options {
        Some(path) => {
            let mut loader = Config::new();
            loader.add_source(FileSource::new(path));
            loader
                .parse()
                .with_context(|| format!("failed to read options from {}", path.display()))?;
            loader.unmarshal::<ConfigOptions>()?
        },
        None => ConfigOptions::default(),
    };
    if let Some(delimiter) = &layers.delimiter {
        options.key_delimiter.clone_from(delimiter);
    }
    if layers.case_insensitive {
        options.case_sensitive = false;
    }
    Ok(options)
}

/// Build an unparsed [`Config`] from the command-line layers.
///
/// The environment, when enabled, outranks every file.
pub fn build_config(layers: &LayerArgs) -> Result<Config> {
    let mut config = Config::with_options(load_options(layers)?);

    for arg in &layers.keys {
        let (key, default) = parse_key_arg(arg);
        config.register_key(key, "", default, Vec::new());
    }
    for key in &layers.required {
        config.require_key(key, "", Vec::new());
    }

    if let Some(prefix) = &layers.env_prefix {
        config.add_source(EnvVars::new(prefix.as_str()));
    }
    for path in &layers.files {
        config.add_source(FileSource::new(path).with_env_substitution(layers.expand_env));
    }

    debug!(?config, "configuration assembled");
    Ok(config)
}

fn encode(format: &str, value: &Value) -> Result<String> {
    let bytes = FormatRegistry::builtin().encoder(format)?.marshal(value)?;
    Ok(String::from_utf8(bytes)?)
}

pub fn get(layers: &LayerArgs, key: &str) -> Result<()> {
    let mut config = build_config(layers)?;
    config.parse()?;
    match config.get(key)? {
        Value::String(s) => println!("{s}"),
        other => println!("{other}"),
    }
    Ok(())
}

pub fn dump(layers: &LayerArgs, format: &str) -> Result<()> {
    let mut config = build_config(layers)?;
    config.parse()?;
    let tree = Value::Table(config.resolved()?);
    println!("{}", encode(format, &tree)?.trim_end());
    Ok(())
}

pub fn blank(layers: &LayerArgs, format: &str) -> Result<()> {
    let config = build_config(layers)?;
    let registry = FormatRegistry::builtin();
    let bytes = config
        .generate_blank(registry.encoder(format)?)
        .context("register keys with --key or --require")?;
    println!("{}", String::from_utf8(bytes)?.trim_end());
    Ok(())
}

pub fn check(layers: &LayerArgs) -> Result<()> {
    let mut config = build_config(layers)?;

    match config.parse() {
        Ok(()) => {
            eprintln!(
                "{BOLD}{GREEN}ok{RESET} {} key(s) registered, {} required",
                config.keys().len(),
                config.required_keys().len()
            );
            Ok(())
        },
        Err(Error::RequiredKeysMissing { keys }) => {
            for key in &keys {
                eprintln!("  {BOLD}{RED}missing{RESET} {key}");
            }
            eprintln!("\n{} required key(s) missing", keys.len());
            std::process::exit(1);
        },
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e}");
            std::process::exit(1);
        },
    }
}
