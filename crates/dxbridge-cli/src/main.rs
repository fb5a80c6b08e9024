//! `dxbridge` — CLI du pont DXC
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `dxbridge_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use dxbridge_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "dxbridge", version, about = "Compile du HLSL en SPIR-V via dxcompiler chargée à l'exécution", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Force la couleur (si la feature `color` est compilée)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compiler un vertex shader HLSL vers SPIR-V
    Compile {
        /// Fichier source (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier de sortie (.spv) ; `-` pour stdout, même nom + .spv si omis
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Dossier d'includes supplémentaire (répétable)
        #[arg(short = 'I', long = "include-dir")]
        include_dirs: Vec<PathBuf>,
        /// Rapport JSON sur stdout
        #[arg(long)]
        json: bool,
        /// Afficher le temps de compilation
        #[arg(long)]
        time: bool,
        /// Compiler sans écrire de sortie
        #[arg(long)]
        check: bool,
        /// Créer les dossiers parents si nécessaire
        #[arg(long = "mkdir")]
        auto_mkdir: bool,
    },

    /// Vérifier que dxcompiler se charge et qu'un compilateur se crée
    Probe {
        /// Rapport JSON sur stdout
        #[arg(long)]
        json: bool,
    },
}

// ──────────────────────────── Entrée / Sortie ────────────────────────────

fn input_from_opt(p: Option<PathBuf>) -> cli::Input {
    match p {
        Some(path) if path.as_os_str() == "-" => cli::Input::Stdin,
        Some(path) => cli::Input::Path(path),
        None => cli::Input::Stdin,
    }
}

fn output_from_opt(p: Option<PathBuf>) -> cli::Output {
    match p {
        Some(path) if path.as_os_str() == "-" => cli::Output::Stdout,
        Some(path) => cli::Output::Path(path),
        None => cli::Output::Auto,
    }
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    #[cfg(feature = "trace")]
    {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()));
        cli::init_logger();
    }
    #[cfg(not(feature = "trace"))]
    let _ = (verbose, quiet);
}

fn init_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Auto => {},
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        },
    }
}

fn real_main() -> Result<i32> {
    let opt = Opt::parse();

    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    let command = match opt.cmd {
        Command::Compile { input, output, include_dirs, json, time, check, auto_mkdir } => {
            cli::Command::Compile(cli::CompileTask {
                input: input_from_opt(input),
                output: output_from_opt(output),
                include_dirs,
                json,
                time,
                check,
                auto_mkdir,
            })
        },
        Command::Probe { json } => cli::Command::Probe(cli::ProbeTask { json }),
    };

    cli::execute(command).context("échec d'exécution de la commande")
}
