use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pianist::{
    midi_to_sequence, read_midi, sequence_to_batch, Config, Pianist, PianistError, PlaybackOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a MIDI file to training windows and print their shapes
    Convert {
        input: PathBuf,
        /// Images per input window
        #[arg(short, long)]
        length: Option<usize>,
        /// Write stream.log and stream_flatten.log while loading
        #[arg(long)]
        show_log: bool,
    },
    /// Write stream.log and stream_flatten.log for a MIDI file
    Dump {
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Play a MIDI file; Ctrl-C fades out and exits
    Play { input: PathBuf },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), PianistError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Convert {
            input,
            length,
            show_log,
        } => {
            if let Some(length) = length {
                config.window_length = length;
            }
            config.show_log |= show_log;
            config.validate()?;

            let sequence = midi_to_sequence(&input, &config)?;
            let batch = sequence_to_batch(&sequence, config.window_length)?;
            println!("sequence: {:?}", sequence.shape());
            println!("inputs:   {:?}", batch.input_shape());
            println!("targets:  {:?}", batch.target_shape());
        }
        Command::Dump { input, out_dir } => {
            let stream = read_midi(&input, &config.loader)?;
            let (tree, flat) = stream.write_logs(&out_dir)?;
            eprintln!("Wrote {} and {}", tree.display(), flat.display());
        }
        Command::Play { input } => {
            let interrupt = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&interrupt);
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .map_err(|e| PianistError::Audio(format!("cannot install Ctrl-C handler: {}", e)))?;

            let mut pianist = Pianist::new(config.player.clone())?;
            if pianist.listen_music(&input, &interrupt)? == PlaybackOutcome::Interrupted {
                eprintln!("Stopped");
            }
        }
    }
    Ok(())
}
