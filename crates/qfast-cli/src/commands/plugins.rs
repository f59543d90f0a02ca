//! Plugins command implementation.

use console::style;

/// Execute the plugins command.
pub fn execute() {
    println!("{} Registered plugins:\n", style("QFAST").cyan().bold());

    section("Models", qfast_decompose::models().names());
    section("Optimizers", qfast_decompose::optimizers().names());
    section("Native tools", qfast_synth::tools().names());
    section("Combiners", qfast_synth::combiners().names());
}

fn section(title: &str, names: Vec<String>) {
    println!("  {}", style(title).bold());
    if names.is_empty() {
        println!("    {}", style("(none registered)").dim());
    }
    for name in names {
        println!("    {} {name}", style("●").green());
    }
    println!();
}
