//! Driver for the pulsekit binary.
use crate::cmdline::{Check, Command, Info, Opts, Render};
use anyhow::Context;
use itertools::Itertools;
use pulsekit_ir::{HardwareConfig, Printer};
use pulsekit_wire as wire;
use std::{fs, io::Write};

/// Run the command given on the command line.
pub fn run() -> anyhow::Result<()> {
    let opts = Opts::get_opts();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    match opts.command {
        Command::Render(cmd) => render(cmd),
        Command::Check(cmd) => check(cmd),
        Command::Info(cmd) => info(cmd),
    }
}

fn render(cmd: Render) -> anyhow::Result<()> {
    let bytes = wire::load(&cmd.file)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let program = wire::deserialize(&bytes)
        .with_context(|| format!("decoding {}", cmd.file.display()))?;
    log::info!("rendering {} to {}", cmd.file.display(), cmd.output);
    let mut out = cmd.output.get_write()?;
    Printer::write_program(&program, &mut out)?;
    out.flush()?;
    Ok(())
}

fn check(cmd: Check) -> anyhow::Result<()> {
    let raw = fs::read_to_string(&cmd.config)
        .with_context(|| format!("reading {}", cmd.config.display()))?;
    let config: HardwareConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", cmd.config.display()))?;
    let bytes = wire::load(&cmd.file)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let program = wire::deserialize(&bytes)
        .with_context(|| format!("decoding {}", cmd.file.display()))?;
    program.validate(&config).with_context(|| {
        format!(
            "{} does not match {}",
            cmd.file.display(),
            cmd.config.display()
        )
    })?;
    println!(
        "{}: ok ({} elements, {} pulses)",
        cmd.file.display(),
        config.elements.len(),
        config.pulses.len()
    );
    Ok(())
}

fn info(cmd: Info) -> anyhow::Result<()> {
    let bytes = wire::load(&cmd.file)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let version = wire::read_version(&bytes)?;
    println!("format version: {version}");
    if version != wire::FORMAT_VERSION {
        println!(
            "unsupported: this build reads version {}",
            wire::FORMAT_VERSION
        );
        return Ok(());
    }
    let header = wire::read_header(&bytes)?;
    println!("variables: {}", header.variables);
    println!("streams: {}", header.streams);
    println!("blocks: {}", header.blocks);
    println!("records: {}", header.records);
    match &header.compiler_options {
        Some(opts) => println!(
            "compiler options: strict={} flags=[{}]",
            opts.strict,
            opts.flags.iter().join(", ")
        ),
        None => println!("compiler options: none"),
    }
    Ok(())
}
