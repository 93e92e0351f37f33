//! splitgen-migrate: move the service between migration stages
//!
//! Edits the env file the server reads; restart the server or call
//! `POST /api/v1/admin/reload` to apply.

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use log::error;
use splitgen::config::Settings;
use splitgen::migration::{MigrationController, MigrationStage};
use splitgen::server::DEFAULT_ENV_FILE;

#[derive(Debug, Parser)]
#[command(name = "splitgen-migrate", version, about)]
struct Cli
{   /// Env file to edit
    #[arg(long, env = "SPLITGEN_ENV_FILE", default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf
  , #[command(subcommand)]
    command: Command
}

#[derive(Debug, Subcommand)]
enum Command
{   /// Apply a stage: 1 = 50/50 A/B, 2 = 75% secondary, 3 = full
    Stage
    {   #[arg(value_parser = clap::value_parser!(u8).range(1..=3))]
        number: u8
    }
  , /// Restore the backup, or return to primary only
    Rollback
  , /// Print the current stage
    Status
}

fn main()
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let cli = Cli::parse();
    let controller = MigrationController::new(&cli.env_file);

    let outcome = match cli.command
    {   Command::Stage { number } => stage(&controller, number)
      , Command::Rollback => rollback(&controller)
      , Command::Status => status(&cli.env_file)
    };

    if let Err(e) = outcome
    {   error!("{}", e);
        std::process::exit(1);
    }
}

fn stage(controller: &MigrationController, number: u8)
  -> Result<(), Box<dyn std::error::Error>>
{   let stage = MigrationStage::from_number(number)
      .ok_or_else(|| format!("unknown stage {}", number))?;
    println!("Applying {}", stage);
    for (key, value) in controller.apply(stage)?
    {   println!("  {}={}", key, value);
    }
    println!(
      "Written to {}; restart or reload the server to apply.",
      controller.env_file().display()
    );
    Ok(())
}

fn rollback(controller: &MigrationController)
  -> Result<(), Box<dyn std::error::Error>>
{   if controller.rollback()?
    {   println!(
          "Restored {} from {}",
          controller.env_file().display(),
          controller.backup_file().display()
        );
    } else
    {   println!("Rolled back to primary only");
    }
    println!("Restart or reload the server to apply.");
    Ok(())
}

fn status(env_file: &Path) -> Result<(), Box<dyn std::error::Error>>
{   let settings = Settings::from_env_file(env_file)?;
    let policy = &settings.policy;
    let on_off = |b: bool| if b { "on" } else { "off" };

    println!("A/B testing:         {}", on_off(policy.ab_testing_enabled()));
    println!("Secondary enabled:   {}", on_off(policy.secondary_enabled()));
    println!("Secondary share:     {:.0}%", policy.secondary_ratio() * 100.0);
    println!("Fallback to primary: {}", on_off(policy.fallback_enabled()));
    println!(
      "Secondary creds:     {}",
      if settings.yandex.credentials_configured() { "configured" } else { "missing" }
    );
    println!("Current stage:       {}", MigrationStage::of(policy));
    Ok(())
}
