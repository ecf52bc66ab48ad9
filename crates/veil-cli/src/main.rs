use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "Veil - Source-level obfuscation for Solidity smart contracts")]
#[command(version = "0.1.0")]
#[command(author = "Gianluca Brigandi <gbrigand@gmail.com>")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the obfuscation pipeline over one Solidity file
    Obfuscate {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON configuration file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "default")]
        preset: Preset,

        #[arg(long)]
        seed: Option<u64>,

        /// Run only these passes
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Skip these passes
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,

        #[arg(long, value_enum)]
        naming: Option<Naming>,

        #[arg(long)]
        salt: Option<String>,

        /// Write every intermediate step to this directory
        #[arg(long)]
        snapshots: Option<PathBuf>,

        #[arg(long)]
        save_mapping: Option<PathBuf>,

        #[arg(long, value_enum)]
        report: Option<ReportFormat>,

        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// Check that a file parses
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Map generated names in a report back to the originals
    Deobfuscate {
        #[arg(short, long)]
        mapping: PathBuf,

        /// Text to translate; stdin when omitted
        input: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the passes in pipeline order
    Passes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Minimal,
    Standard,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Naming {
    Counter,
    Hashed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

impl From<Naming> for veil_core::NamingStrategy {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Counter => veil_core::NamingStrategy::Counter,
            Naming::Hashed => veil_core::NamingStrategy::Hashed,
        }
    }
}

impl From<ReportFormat> for veil_emit::OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Text => veil_emit::OutputFormat::Text,
            ReportFormat::Json => veil_emit::OutputFormat::Json,
        }
    }
}

struct ObfuscateArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    preset: Preset,
    seed: Option<u64>,
    only: Vec<String>,
    skip: Vec<String>,
    naming: Option<Naming>,
    salt: Option<String>,
    snapshots: Option<PathBuf>,
    save_mapping: Option<PathBuf>,
    report: Option<ReportFormat>,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Obfuscate {
            input,
            output,
            config,
            preset,
            seed,
            only,
            skip,
            naming,
            salt,
            snapshots,
            save_mapping,
            report,
            verbose,
        } => {
            init_tracing(verbose);
            cmd_obfuscate(ObfuscateArgs {
                input,
                output,
                config,
                preset,
                seed,
                only,
                skip,
                naming,
                salt,
                snapshots,
                save_mapping,
                report,
            })
        }
        Commands::Validate { input, verbose } => {
            init_tracing(0);
            cmd_validate(input, verbose)
        }
        Commands::Deobfuscate {
            mapping,
            input,
            output,
        } => cmd_deobfuscate(mapping, input, output),
        Commands::Passes => cmd_passes(),
    }
}

fn build_config(args: &ObfuscateArgs) -> Result<veil_core::ObfuscationConfig> {
    use veil_core::{ObfuscationConfig, PassToggles};

    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => ObfuscationConfig::load_from_file(path)?,
        (None, Preset::Default) => ObfuscationConfig::default(),
        (None, Preset::Minimal) => ObfuscationConfig::minimal(),
        (None, Preset::Standard) => ObfuscationConfig::standard(),
    };

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if !args.only.is_empty() {
        config.passes = PassToggles::all(false);
        for pass in &args.only {
            *config
                .passes
                .get_mut(pass)
                .ok_or_else(|| anyhow::anyhow!("Unknown pass `{}`", pass))? = true;
        }
    }
    for pass in &args.skip {
        *config
            .passes
            .get_mut(pass)
            .ok_or_else(|| anyhow::anyhow!("Unknown pass `{}`", pass))? = false;
    }
    if let Some(naming) = args.naming {
        config.naming = naming.into();
    }
    if args.salt.is_some() {
        config.hash_salt = args.salt.clone();
    }
    if args.save_mapping.is_some() {
        config.retain_mapping = true;
    }
    Ok(config)
}

fn cmd_obfuscate(args: ObfuscateArgs) -> Result<()> {
    use colored::*;
    use std::fs;
    use std::io::IsTerminal;
    use veil_emit::{RunReport, SnapshotWriter};
    use veil_transform::Pipeline;

    let config = build_config(&args)?;
    let source = fs::read_to_string(&args.input)?;
    let input_name = args.input.display().to_string();

    let pipeline = Pipeline::new(config);
    tracing::info!(passes = ?pipeline.pass_names(), input = %input_name, "starting pipeline");
    let seed = pipeline.config().seed;

    let writer = match &args.snapshots {
        Some(dir) => {
            let writer = SnapshotWriter::new(dir)?;
            writer.write_input(&source)?;
            Some(writer)
        }
        None => None,
    };

    let result = pipeline.run(&source);
    let use_colors = std::io::stderr().is_terminal();

    let output = match result {
        Ok(output) => output,
        Err(error) => {
            if let Some(writer) = &writer {
                writer.write_all(&error.snapshots)?;
            }
            if let Some(format) = args.report {
                let report = RunReport::from_error(&source, &error, seed).with_input_name(&input_name);
                eprintln!("{}", report.render(format.into(), use_colors)?);
            }
            eprintln!("{} {}", "ERROR:".bright_red().bold(), error);
            return Err(anyhow::anyhow!("Obfuscation failed"));
        }
    };

    if let Some(writer) = &writer {
        writer.write_all(&output.snapshots)?;
    }

    if let (Some(path), Some(mapping)) = (&args.save_mapping, &output.mapping) {
        mapping.save_to_file(path)?;
        tracing::info!(path = %path.display(), names = mapping.mapping.len(), "saved mapping");
    }

    let report = args.report.map(|format| {
        let report = RunReport::from_output(&source, &output, seed).with_input_name(&input_name);
        (report, format)
    });

    match &args.output {
        Some(path) => {
            fs::write(path, &output.source)?;
            if let Some((report, format)) = report {
                println!("{}", report.render(format.into(), std::io::stdout().is_terminal())?);
            }
        }
        None => {
            println!("{}", output.source);
            if let Some((report, format)) = report {
                eprintln!("{}", report.render(format.into(), use_colors)?);
            }
        }
    }

    Ok(())
}

fn cmd_validate(input: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;
    use std::fs;

    if verbose {
        println!("{}", " Validating Solidity".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_cyan());
        println!(" Input: {}", input.display());
        println!();
    }

    let source = fs::read_to_string(&input)?;

    match veil_parser::parse(&source) {
        Ok(tree) => {
            println!("{}", " VALID".bright_green().bold());
            if verbose {
                println!("   Contracts: {}", tree.contracts().count());
                println!("   Functions: {}", tree.functions().len());
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", " INVALID".bright_red().bold());
            println!("\n{}", "Parse Error:".bright_red());
            println!("{}", e);
            Err(anyhow::anyhow!("Validation failed"))
        }
    }
}

fn cmd_deobfuscate(mapping: PathBuf, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    use colored::*;
    use std::fs;
    use veil_core::ObfuscationMapping;

    let mapping = ObfuscationMapping::load_from_file(&mapping)?;

    let text = if let Some(path) = input {
        fs::read_to_string(&path)?
    } else {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let restored = mapping.deobfuscate(&text);

    if let Some(output_path) = output {
        fs::write(&output_path, &restored)?;
        println!(
            " {} De-obfuscated text saved to: {}",
            "SUCCESS:".bright_green().bold(),
            output_path.display()
        );
    } else {
        print!("{}", restored);
    }

    Ok(())
}

fn cmd_passes() -> Result<()> {
    use colored::*;

    for (step, pass) in veil_transform::all_passes().iter().enumerate() {
        println!(
            "{:>2}. {} {}",
            step + 1,
            format!("{:<9}", pass.name()).bright_yellow(),
            pass.description()
        );
    }
    Ok(())
}
