//! dxbridge-cli — bibliothèque interne du binaire `dxbridge`
//!
//! `main.rs` ne fait que parser les arguments et initialiser logger/couleurs ;
//! tout le reste est ici, testable sans moteur réel grâce au trait `Backend`.
//!
//! - `compile` : source HLSL → SPIR-V (includes résolus depuis le dossier de
//!   la source puis les `-I`), rapport texte ou JSON
//! - `probe` : état de la bibliothèque DXC (chargement, création du compilateur)
//!
//! Codes de sortie : 0 succès, 1 erreur (E/S, moteur absent…), 2 diagnostics.

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use dxbridge_compiler::{
    CompilationOutcome, Compiler, FileSystemIncludeHandler, IncludeHandler, Loader, Status,
};
use log::debug;
use serde::Serialize;

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

/// Code de sortie quand le moteur a rejeté le shader.
pub const EXIT_DIAGNOSTICS: i32 = 2;

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (le parsing CLI reste dans main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Compile une source HLSL en SPIR-V.
    Compile(CompileTask),
    /// Vérifie que la bibliothèque DXC se charge et qu'un compilateur se crée.
    Probe(ProbeTask),
}

#[derive(Clone, Debug, Default)]
pub struct CompileTask {
    pub input: Input,               // chemin ou stdin
    pub output: Output,             // chemin, stdout ou auto (même nom, .spv)
    pub include_dirs: Vec<PathBuf>, // -I, après le dossier de la source
    pub json: bool,                 // rapport JSON sur stdout
    pub time: bool,                 // afficher le timing
    pub check: bool,                // compiler sans écrire
    pub auto_mkdir: bool,           // crée les dossiers parents si besoin
}

#[derive(Clone, Debug, Default)]
pub struct ProbeTask {
    pub json: bool,
}

/// Entrée texte : fichier ou `-` (=stdin).
#[derive(Clone, Debug, Default)]
pub enum Input {
    Path(PathBuf),
    #[default]
    Stdin,
}

/// Destination du bytecode.
#[derive(Clone, Debug, Default)]
pub enum Output {
    Path(PathBuf),
    Stdout,
    /// Même nom que la source, extension `.spv`.
    #[default]
    Auto,
}

/// Moteur de compilation ; `DxcBackend` en production.
pub trait Backend {
    fn compile(&mut self, source: &str, include: &mut dyn IncludeHandler) -> CompilationOutcome;
}

/// Moteur réel : `dxcompiler` chargé dynamiquement.
pub struct DxcBackend {
    compiler: Compiler,
}

impl DxcBackend {
    /// Charge la bibliothèque et crée un compilateur.
    pub fn open() -> Result<Self> {
        let loader = Loader::open().context("chargement de dxcompiler")?;
        let compiler = Compiler::new(&loader).context("création du compilateur DXC")?;
        Ok(Self { compiler })
    }
}

impl Backend for DxcBackend {
    fn compile(&mut self, source: &str, include: &mut dyn IncludeHandler) -> CompilationOutcome {
        self.compiler.compile(source, Some(include))
    }
}

// ───────────────────────────── Rapports ─────────────────────────────

/// Rapport d'une compilation (`--json`).
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CompileReport {
    pub input: String,
    pub success: bool,
    pub spirv: bool,
    pub bytes: usize,
    pub output: Option<String>,
    pub diagnostics: Option<String>,
    pub elapsed_ms: u128,
}

/// Rapport de `probe`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ProbeReport {
    pub version: &'static str,
    pub library: String,
    pub loader: Status,
    pub compiler: Option<Status>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub const fn is_ok(&self) -> bool {
        self.loader.is_ok() && matches!(self.compiler, Some(Status::Ok))
    }
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger selon la feature `trace`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .try_init();
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande avec le moteur réel. Retourne un code de sortie.
pub fn execute(cmd: Command) -> Result<i32> {
    match cmd {
        Command::Compile(task) => {
            // la source est lue avant le chargement du moteur
            let source = prepare(&task)?;
            let mut backend = DxcBackend::open()?;
            compile_source(&task, &source, &mut backend)
        }
        Command::Probe(task) => probe_entry(&task),
    }
}

/// Compilation avec un moteur donné.
pub fn compile_entry(task: &CompileTask, backend: &mut dyn Backend) -> Result<i32> {
    let source = prepare(task)?;
    compile_source(task, &source, backend)
}

/// Vérifie la combinaison d'options puis lit la source.
fn prepare(task: &CompileTask) -> Result<String> {
    if task.json && !task.check && matches!(task.output, Output::Stdout) {
        bail!("--json et une sortie sur stdout (-o -) sont incompatibles");
    }
    read_source(&task.input).context("lecture de la source")
}

fn compile_source(task: &CompileTask, source: &str, backend: &mut dyn Backend) -> Result<i32> {
    let mut includes = include_handler(&task.input, &task.include_dirs);

    let start = Instant::now();
    let outcome = backend.compile(source, &mut includes);
    let elapsed = start.elapsed();
    debug!("compilation terminée en {elapsed:?}");

    let written = match (&outcome, task.check) {
        (CompilationOutcome::Success(bytes), false) => write_output(task, bytes)?,
        _ => None,
    };

    let report = CompileReport {
        input: input_label(&task.input),
        success: outcome.is_successful(),
        spirv: outcome.is_spirv(),
        bytes: outcome.bytecode().len(),
        output: written.as_deref().map(display),
        diagnostics: outcome.error_message().map(str::to_owned),
        elapsed_ms: elapsed.as_millis(),
    };

    if task.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, task.time, elapsed);
    }

    Ok(if report.success { 0 } else { EXIT_DIAGNOSTICS })
}

/// Sonde la bibliothèque DXC.
pub fn probe_entry(task: &ProbeTask) -> Result<i32> {
    let report = probe();
    if task.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        status(Tone::Info, "LIBRARY", &report.library);
        match (&report.compiler, &report.error) {
            (Some(Status::Ok), _) => status(Tone::Ok, "PROBE", "dxcompiler chargée, compilateur créé"),
            (_, Some(err)) => status(Tone::Error, "PROBE", err),
            _ => status(Tone::Error, "PROBE", &format!("{:?}", report.loader)),
        }
    }
    Ok(i32::from(!report.is_ok()))
}

/// Ouvre la bibliothèque puis crée un compilateur, sans rien propager.
pub fn probe() -> ProbeReport {
    let library = Loader::library_name().to_string_lossy().into_owned();
    let version = env!("CARGO_PKG_VERSION");
    let loader = match Loader::open() {
        Ok(loader) => loader,
        Err(e) => {
            return ProbeReport { version, library, loader: Status::from(&e), compiler: None, error: Some(e.to_string()) }
        }
    };
    match Compiler::new(&loader) {
        Ok(_) => ProbeReport { version, library, loader: Status::Ok, compiler: Some(Status::Ok), error: None },
        Err(e) => ProbeReport {
            version,
            library,
            loader: Status::Ok,
            compiler: Some(Status::from(&e)),
            error: Some(e.to_string()),
        },
    }
}

// ───────────────────────────── Includes ─────────────────────────────

/// Dossier de la source (si fichier) puis les `-I`, dans l'ordre.
pub fn include_handler(input: &Input, include_dirs: &[PathBuf]) -> FileSystemIncludeHandler {
    let mut handler = FileSystemIncludeHandler::default();
    if let Input::Path(p) = input {
        let dir = p.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        handler.push_root(dir);
    }
    for dir in include_dirs {
        handler.push_root(dir.clone());
    }
    handler
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_source(input: &Input) -> Result<String> {
    match input {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            Ok(s)
        }
        Input::Path(p) => fs::read_to_string(p).with_context(|| format!("ouverture: {}", display(p))),
    }
}

/// Écrit le bytecode ; renvoie le chemin écrit (`None` pour stdout).
fn write_output(task: &CompileTask, bytes: &[u8]) -> Result<Option<PathBuf>> {
    let path = match (&task.output, &task.input) {
        (Output::Stdout, _) => {
            let mut w = BufWriter::new(io::stdout().lock());
            w.write_all(bytes)?;
            w.flush()?;
            return Ok(None);
        }
        (Output::Path(p), _) => p.clone(),
        (Output::Auto, Input::Path(p)) => default_spirv_path(p),
        (Output::Auto, Input::Stdin) => PathBuf::from("out.spv"),
    };
    if task.auto_mkdir {
        if let Some(parent) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }
    write_bytes_atomic(&path, bytes).with_context(|| format!("écriture de {}", display(&path)))?;
    Ok(Some(path))
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => bail!("chemin de sortie sans parent: {}", display(path)),
    };
    let name = path.file_name().ok_or_else(|| anyhow!("chemin de sortie sans nom: {}", display(path)))?;
    let tmp = unique_tmp_path(parent, name);
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        w.write_all(bytes)?;
        w.flush()?;
    }
    if path.exists() {
        // Windows : rename sur cible existante peut échouer
        if let Err(e) = fs::remove_file(path) {
            debug!("suppression de {} impossible : {e}", display(path));
        }
    }
    fs::rename(&tmp, path).or_else(|_| fs::copy(&tmp, path).and_then(|_| fs::remove_file(&tmp)))?;
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!("{}.tmp{}", base.to_string_lossy(), i));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

/// `shaders/tri.hlsl` → `shaders/tri.spv`
pub fn default_spirv_path(src: &Path) -> PathBuf {
    src.with_extension("spv")
}

fn input_label(input: &Input) -> String {
    match input {
        Input::Path(p) => display(p),
        Input::Stdin => "-".to_owned(),
    }
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn print_report(report: &CompileReport, time: bool, elapsed: Duration) {
    if report.success {
        let target = report.output.as_deref().unwrap_or("-");
        status(Tone::Ok, "COMPILE", &format!("{} → {target} ({} octets)", report.input, report.bytes));
        if !report.spirv {
            status(Tone::Error, "WARN", "la sortie ne commence pas par le mot magique SPIR-V");
        }
    } else {
        match report.diagnostics.as_deref() {
            Some("") | None => status(Tone::Error, "ERROR", "le moteur n'a pas pu compiler (aucun diagnostic)"),
            Some(diag) => {
                status(Tone::Error, "ERROR", &report.input);
                eprint!("{diag}");
                if !diag.ends_with('\n') {
                    eprintln!();
                }
            }
        }
    }
    if time {
        status(Tone::Info, "TIME", &format!("compile: {} ms", elapsed.as_millis()));
    }
}

#[derive(Clone, Copy)]
enum Tone {
    Ok,
    Info,
    Error,
}

/// Ligne d'état sur stderr : étiquette colorée (feature `color`) puis message.
fn status(tone: Tone, tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        let tag = match tone {
            Tone::Ok => tag.green().bold().to_string(),
            Tone::Info => tag.blue().bold().to_string(),
            Tone::Error => tag.red().bold().to_string(),
        };
        eprintln!("{tag} {msg}");
    }
    #[cfg(not(feature = "color"))]
    {
        let _ = tone;
        eprintln!("{tag} {msg}");
    }
}

// ───────────────────────────── Tests ─────────────────────────────
