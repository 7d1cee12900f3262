use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use log::{error, info};

use music_pack_service::api::{v1, AppState};
use music_pack_service::sources::{LocalFiles, SKIP_SENTINEL};
use music_pack_service::template::TemplateKind;
use music_pack_service::{logging, BuildCommand, BuildSource, CancelToken, PackAssembler, PackError, Settings};

/// Builds music resource packs
#[derive(Parser)]
#[command(name = "music-pack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: music_pack.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a pack
    Build {
        #[command(subcommand)]
        source: SourceArgs,
    },

    /// Print the event slots of a template in order
    Slots {
        /// generic or terraria
        #[arg(value_parser = ["generic", "terraria"])]
        kind: String,
    },

    /// Run the HTTP API
    Serve {
        /// Address to bind (default from settings)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum SourceArgs {
    /// One local audio file per template slot
    Local {
        /// Pack name
        #[arg(short, long)]
        name: String,

        /// Resource pack folder to create the pack in
        #[arg(short, long)]
        target: PathBuf,

        /// Source file for each slot, in slot order; "-" drops the slot
        #[arg(short, long = "slot", num_args = 1..)]
        slots: Vec<String>,

        /// Image to use as the pack icon
        #[arg(long)]
        icon: Option<PathBuf>,
    },

    /// A YouTube playlist
    Youtube {
        /// Playlist URL
        #[arg(short, long)]
        url: String,

        #[arg(short, long)]
        target: PathBuf,

        /// Video index for each slot, in slot order; "-" drops the slot.
        /// Without slots every video becomes its own event.
        #[arg(short, long = "slot", num_args = 1..)]
        slots: Vec<String>,

        /// Start from the Terraria template instead of the generic one
        #[arg(long)]
        terraria_template: bool,
    },

    /// An extracted Terraria resource pack
    Terraria {
        /// Folder containing pack.json and Content/Music
        #[arg(short, long)]
        source: PathBuf,

        #[arg(short, long)]
        target: PathBuf,

        /// Fail when a track has no music file
        #[arg(long)]
        strict: bool,
    },
}

impl SourceArgs {
    fn into_command(self) -> Result<BuildCommand, PackError> {
        let (source, target) = match self {
            SourceArgs::Local { name, target, slots, icon } => {
                let slots = LocalFiles::from_raw(&slots).into_slots();
                (BuildSource::Local { name, slots, icon }, target)
            }
            SourceArgs::Youtube { url, target, slots, terraria_template } => {
                let slots = if slots.is_empty() {
                    None
                } else {
                    Some(slots.iter().map(|s| parse_index(s)).collect::<Result<Vec<_>, _>>()?)
                };
                let template = terraria_template.then_some(TemplateKind::Terraria);
                (BuildSource::Youtube { url, slots, template }, target)
            }
            SourceArgs::Terraria { source, target, strict } => {
                (BuildSource::Terraria { source, strict: strict.then_some(true) }, target)
            }
        };
        Ok(BuildCommand { source, target })
    }
}

fn parse_index(raw: &str) -> Result<Option<usize>, PackError> {
    let raw = raw.trim();
    if raw == SKIP_SENTINEL {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| PackError::InvalidCommand(format!("\"{}\" is not a video index", raw)))
}

fn run(cli: Cli) -> Result<(), PackError> {
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { source } => {
            let command = source.into_command()?;
            let assembler = PackAssembler::from_settings(settings);
            let report = assembler.assemble(&command, &CancelToken::new())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Slots { kind } => {
            let kind = TemplateKind::parse(&kind)
                .ok_or_else(|| PackError::InvalidCommand(format!("unknown template kind \"{}\"", kind)))?;
            let assembler = PackAssembler::from_settings(settings);
            for (i, key) in assembler.resolver().load_template(kind)?.keys().enumerate() {
                println!("{:>3}  {}", i, key);
            }
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            serve(settings, bind.clone()).map_err(|e| PackError::io(PathBuf::from(bind), e))
        }
    }
}

fn serve(settings: Settings, bind: String) -> std::io::Result<()> {
    v1::init_start_time();
    let state = web::Data::new(AppState::new(Arc::new(PackAssembler::from_settings(settings))));

    actix_web::rt::System::new().block_on(async move {
        info!("Listening on {}", bind);
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .configure(v1::config)
        })
        .bind(&bind)?
        .run()
        .await
    })
}

fn main() -> ExitCode {
    logging::init_logger();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
