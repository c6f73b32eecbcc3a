use super::CommandContext;
use crate::ConfigCommands;
use anyhow::Result;

pub fn handle_config_command(ctx: &CommandContext, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show_config(ctx),
    }
}

fn show_config(ctx: &CommandContext) -> Result<()> {
    let config = &ctx.config;
    let unset = || "-".to_string();

    println!("Current Configuration");
    println!("====================");

    println!("Data Directory: {}", config.data_dir.display());
    println!("Resume Records: {}", ctx.resume_path().display());
    println!();

    println!("Cluster Settings:");
    println!("  Namespace: {}", config.cluster.namespace);
    println!("  Agent: {} (container {})", config.cluster.agent_name, config.cluster.container);
    println!("  kubectl: {}", config.cluster.kubectl);
    println!(
        "  Source Kubeconfig: {}",
        config.cluster.src_kubeconfig.as_ref().map(|p| p.display().to_string()).unwrap_or_else(unset)
    );
    println!(
        "  Destination Kubeconfig: {}",
        config.cluster.dst_kubeconfig.as_ref().map(|p| p.display().to_string()).unwrap_or_else(unset)
    );
    if config.cluster.cidr_map.is_empty() {
        println!("  CIDR Map: -");
    } else {
        println!("  CIDR Map:");
        for (from, to) in &config.cluster.cidr_map {
            println!("    {} -> {}", from, to);
        }
    }
    println!();

    println!("Probe Settings:");
    println!("  Granularity: {}", config.granularity());
    println!("  Probe: {}", config.probe_kind());
    println!("  Max Concurrency: {}", config.probe.max_concurrency);
    println!("  Timeout: {}s", config.probe.timeout_secs);

    Ok(())
}
