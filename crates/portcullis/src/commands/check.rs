//! Check command - validates the configuration without starting the gateway.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print the effective configuration as TOML
    #[arg(long)]
    pub print: bool,
}

/// Run the check command.
pub fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    if args.print {
        let mut printable = config.clone();
        if !printable.client_secret.is_empty() {
            printable.client_secret = "********".to_string();
        }
        printable.encryption_key = "********".to_string();
        print!("{}", printable.to_toml()?);
        return Ok(());
    }

    println!("Configuration OK");
    println!("  listen:     {}", config.listen);
    println!(
        "  upstream:   {}",
        config.upstream_url.as_deref().unwrap_or("(none)")
    );
    println!("  client:     {}", config.client_id);
    println!("  resources:  {}", config.resources.len());
    if ctx.verbose {
        for resource in &config.resources {
            let access = if resource.white_listed {
                "white-listed".to_string()
            } else if resource.roles.is_empty() {
                "authenticated".to_string()
            } else {
                format!("roles {}", resource.roles.join(","))
            };
            println!("    {} ({})", resource.uri, access);
        }
    }

    Ok(())
}
