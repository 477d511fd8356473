use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
	/// Config file to use instead of the platform default
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// Address to listen on, overrides the config file
	#[arg(short, long)]
	pub bind: Option<String>,

	/// Play a video file at startup instead of waiting for the dashboard
	#[arg(short, long)]
	pub video: Option<PathBuf>,

	/// Replay recorded detections (JSON) instead of running a model
	#[arg(short, long)]
	pub replay: Option<PathBuf>,

	/// Export the detection history to a CSV file on shutdown
	#[arg(short, long)]
	pub export: Option<PathBuf>,

	/// Output debug information
	#[arg(short, long)]
	pub debug: bool,

	/// Show detections in a window (needs the opencv feature)
	#[arg(long)]
	pub display: bool,

	/// Minimum detector confidence, overrides the config file
	#[arg(long)]
	pub default_confidence: Option<f32>,

	//  Caffe 'deploy' prototxt file
	#[arg(short, long)]
	pub proto: Option<String>,

	/// Caffe model
	#[arg(short, long)]
	pub model: Option<String>,
}

pub fn parse_args() -> Args {
	Args::parse()
}
