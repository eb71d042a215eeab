use crate::error::Result;
use crate::plugins::{ExecutableUnit, PluginRegistry};
use colored::Colorize;
use prettytable::{format, Table};

/// Print registered plugins, skip reasons and warnings
pub fn list_plugins(registry: &PluginRegistry) -> Result<()> {
    if registry.is_empty() {
        println!("{}", "No plugins loaded.".yellow());
    } else {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row![
            "Command".bold(),
            "Name".bold(),
            "Parameters".bold(),
            "Unit".bold(),
            "Description".bold()
        ]);

        for plugin in registry.list() {
            let unit = match &plugin.unit {
                ExecutableUnit::Builtin(name) => format!("builtin:{}", name),
                ExecutableUnit::Exec(spec) => format!("exec:{}", spec.program),
            };
            table.add_row(prettytable::row![
                plugin.command.cyan(),
                plugin.plugin_name,
                plugin.parameter_string(),
                unit,
                plugin.description
            ]);
        }

        println!("\nLoaded plugins:");
        table.printstd();
        println!();
    }

    for skipped in registry.skipped() {
        println!(
            "{} {}: {}",
            "skipped".red(),
            skipped.name.bold(),
            skipped.reason
        );
    }
    for warning in registry.warnings() {
        println!("{} {}", "warning".yellow(), warning);
    }
    Ok(())
}
