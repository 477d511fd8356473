use anyhow::{Context, Result};
use log::logger::AdvancedLogger;
use log::{LogLevel, critical, info, warning};
use lookout::api::{AppState, router};
use lookout::auth::TokenCodec;
use lookout::cli::{Args, parse_args};
use lookout::conf::{Conf, load_config};
use lookout::cv::overlay::{LogOverlay, Overlay};
use lookout::cv::replay::ReplayDetector;
use lookout::cv::{Detector, SourceFactory};
use lookout::export::export_history;
use lookout::pipeline::Pipeline;
use lookout::stats::SharedDetections;
use lookout::store::MemoryUserStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() {
	let args = parse_args();
	let level = if args.debug { LogLevel::Debug } else { LogLevel::Info };
	if let Err(e) = AdvancedLogger::init(level) {
		eprintln!("Failed to initialize logger: {e}");
	}

	if let Err(e) = run(args).await {
		critical!("{:#}", e);
		std::process::exit(1);
	}
}

async fn run(args: Args) -> Result<()> {
	let conf = load_config(args.config.as_deref())?;
	if !args.debug {
		match LogLevel::parse(&conf.log_level) {
			Some(level) => {
				if let Some(logger) = log::logger() {
					logger.set_level(level);
				}
			}
			None => warning!("Unknown log level '{}' in config", conf.log_level),
		}
	}

	let codec = Arc::new(TokenCodec::new(&conf.jwt_secret()?));

	let users = Arc::new(MemoryUserStore::new());
	users
		.seed(&conf.seed_users)
		.await
		.context("Failed to seed users")?;

	let state = SharedDetections::new(&conf.state_config());
	let pipeline = Arc::new(Pipeline::new(state, source_factory(), overlay(args.display)));
	let timer = pipeline.spawn_frame_rate_timer();
	let loading = pipeline.load_detector(detector_loader(&args, &conf));

	if let Some(video) = &args.video {
		loading.await.context("Detector loader panicked")?;
		match pipeline.play_video(video).await {
			Ok(session) => info!("Playing {} as {}", video.display(), session.url),
			Err(e) => warning!("Could not play {}: {}", video.display(), e),
		}
	}

	let app = router(AppState {
		codec,
		users,
		pipeline: Arc::clone(&pipeline),
		secure_cookies: conf.secure_cookies,
	});

	let bind = args.bind.clone().unwrap_or_else(|| conf.bind.clone());
	let listener = TcpListener::bind(&bind)
		.await
		.with_context(|| format!("Failed to bind {bind}"))?;
	info!("Listening on http://{}", bind);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			if let Err(e) = signal::ctrl_c().await {
				warning!("Failed to listen for CTRL+C: {}", e);
				std::future::pending::<()>().await;
			}
			info!("Received CTRL+C signal");
		})
		.await
		.context("Server error")?;

	info!("Initiating shutdown procedure");
	pipeline.shutdown().await;
	timer.await.context("Frame rate timer panicked")?;

	if let Some(path) = &args.export {
		export_history(path, &pipeline.state().history())?;
	}
	Ok(())
}

#[cfg(not(feature = "opencv"))]
fn source_factory() -> Arc<dyn SourceFactory> {
	Arc::new(lookout::cv::replay::SyntheticFactory::default())
}

#[cfg(feature = "opencv")]
fn source_factory() -> Arc<dyn SourceFactory> {
	Arc::new(lookout::cv::capture::OpencvFactory)
}

fn overlay(display: bool) -> Box<dyn Overlay> {
	#[cfg(feature = "opencv")]
	if display {
		return Box::new(lookout::cv::overlay::WindowOverlay::new());
	}
	#[cfg(not(feature = "opencv"))]
	if display {
		warning!("--display needs the opencv feature, logging detections instead");
	}
	Box::new(LogOverlay)
}

type DetectorLoader = Box<dyn FnOnce() -> Result<Box<dyn Detector>> + Send>;

fn detector_loader(args: &Args, conf: &Conf) -> DetectorLoader {
	if let Some(replay) = args.replay.clone() {
		return Box::new(move || Ok(Box::new(ReplayDetector::from_file(&replay)?) as Box<dyn Detector>));
	}

	let proto = args.proto.clone().unwrap_or_else(|| conf.model.proto.clone());
	let model = args.model.clone().unwrap_or_else(|| conf.model.model.clone());
	let confidence = args.default_confidence.unwrap_or(conf.model.confidence);
	ssd_loader(proto, model, confidence)
}

#[cfg(feature = "opencv")]
fn ssd_loader(proto: String, model: String, confidence: f32) -> DetectorLoader {
	Box::new(move || {
		let net = lookout::cv::net::SsdDetector::new(&proto, &model, confidence)
			.with_context(|| format!("Failed to load model {model}"))?;
		Ok(Box::new(net) as Box<dyn Detector>)
	})
}

#[cfg(not(feature = "opencv"))]
fn ssd_loader(_proto: String, model: String, _confidence: f32) -> DetectorLoader {
	Box::new(move || {
		Err(anyhow::anyhow!(
			"cannot load {model}: built without the opencv feature, pass --replay instead"
		))
	})
}
