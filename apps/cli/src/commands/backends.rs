//! Backends command implementation.

use anyhow::Result;
use colored::Colorize;
use quicktrain_orchestrator::{BackendDescriptor, BackendRegistry};
use quicktrain_training::{ArgValue, ComputeClass};

pub fn execute(json_output: bool) -> Result<()> {
    let registry = BackendRegistry::builtin()?;

    if json_output {
        let descriptors: Vec<&BackendDescriptor> = registry.descriptors().iter().map(AsRef::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Backends ({})", registry.len()).bold().cyan());
    println!();

    for descriptor in registry.descriptors() {
        let aliases = if descriptor.aliases.is_empty() {
            String::new()
        } else {
            format!(" ({})", descriptor.aliases.join(", "))
        };
        println!("{}{}", descriptor.model_type.bold(), aliases.dimmed());
        println!("  Capability:  {}", descriptor.capability);
        println!("  Compute:     {}", compute_label(&descriptor.environment.compute));
        println!("  Timeout:     {}s", descriptor.environment.timeout.as_secs());
        println!("  Artifact:    models/{}_<jobId>.{}", descriptor.model_type, descriptor.artifact_extension);
        println!("  Parameters:");
        for (position, param) in descriptor.params.iter().enumerate() {
            let marker = if param.required { "*".red().to_string() } else { " ".to_string() };
            let default = match &param.default {
                Some(ArgValue::Flag(b)) => format!(" = {b}"),
                Some(ArgValue::Text(s)) => format!(" = {s:?}"),
                Some(ArgValue::Absent) | None => String::new(),
            };
            println!("    {position}. {}{marker}{}", param.name.cyan(), default.dimmed());
        }
        println!();
    }
    println!("  {}", "* required".dimmed());
    Ok(())
}

fn compute_label(compute: &ComputeClass) -> String {
    match compute {
        ComputeClass::Gpu { model } => format!("GPU {model}"),
        ComputeClass::Cpu { cores } => format!("CPU x{cores}"),
    }
}
