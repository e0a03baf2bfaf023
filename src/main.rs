use std::{convert::Infallible, sync::Arc};

use mime::Mime;
use warp::{Filter, Rejection, Reply};

use crate::{
    config::Config,
    data::{encode::MediaProcessor, s3utils::ObjectStore},
    util::OptFmt,
    video::VideoRepository,
};

mod auth;
mod config;
mod data;
mod error;
mod model;
mod schema;
#[cfg(test)]
mod test_util;
mod util;
mod video;

/// Immutable state shared by all requests.
pub struct AppState {
    pub config: Config,
    pub videos: Arc<dyn VideoRepository>,
    pub object_store: Arc<dyn ObjectStore>,
    pub media: Arc<dyn MediaProcessor>,
}

fn main() {
    dotenvy::dotenv().ok();

    setup_logger();

    let config = Config::from_env().expect("Failed to load configuration");
    data::assets::ensure_assets_dir(&config.assets_root)
        .expect("Failed to create assets directory");

    setup_tokio_runtime(config);
}

pub fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let upload_thumbnail_route = warp::path!("api" / "videos" / String / "thumbnail")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(auth::with_user_id(state.clone()))
        .and(warp::header::<Mime>("content-type"))
        .and(warp::body::stream())
        .and_then(data::upload_thumbnail_handler);

    let upload_video_route = warp::path!("api" / "videos" / String / "video")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(auth::with_user_id(state.clone()))
        .and(warp::header::<Mime>("content-type"))
        .and(warp::body::stream())
        .and_then(data::upload_video_handler);

    let get_video_route = warp::path!("api" / "videos" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(auth::with_user_id(state.clone()))
        .and_then(data::get_video_handler);

    let assets_route =
        warp::path("assets").and(warp::fs::dir(state.config.assets_root.clone()));

    upload_thumbnail_route
        .or(upload_video_route)
        .or(get_video_route)
        .or(assets_route)
        .recover(error::handle_rejection)
}

/// Start a tokio runtime that runs a warp server.
#[tokio::main]
async fn setup_tokio_runtime(config: Config) {
    let videos = video::PgVideoRepository::new(&config.database_url, config.max_db_connections)
        .expect("Failed to initialise connection pool");
    let object_store =
        data::s3utils::S3ObjectStore::from_config(&config).expect("Failed to create S3 bucket");
    let media = data::encode::FfmpegProcessor::new(
        config.ffprobe_path.clone(),
        config.ffmpeg_path.clone(),
    );

    let port = config.port;
    let tls_paths = config.cert_path.clone().zip(config.key_path.clone());
    let state = Arc::new(AppState {
        config,
        videos: Arc::new(videos),
        object_store: Arc::new(object_store),
        media: Arc::new(media),
    });

    let filter = routes(state).with(warp::log::custom(|info| {
        let log_level = if info.elapsed().as_secs() >= 10 && !info.path().ends_with("/video") {
            log::Level::Warn
        } else if info.elapsed().as_millis() >= 250 {
            log::Level::Info
        } else {
            log::Level::Debug
        };

        log::log!(
            target: "tubely::api",
            log_level,
            "{} \"{} {} {:?}\" {} \"{}\" \"{}\" {:?}",
            OptFmt(info.remote_addr()),
            info.method(),
            info.path(),
            info.version(),
            info.status().as_u16(),
            OptFmt(info.referer()),
            OptFmt(info.user_agent()),
            info.elapsed(),
        );
    }));

    log::info!("Starting server on port {}", port);
    if let Some((cert_path, key_path)) = tls_paths {
        warp::serve(filter)
            .tls()
            .cert_path(cert_path)
            .key_path(key_path)
            .run(([0, 0, 0, 0], port))
            .await;
    } else {
        warp::serve(filter).run(([0, 0, 0, 0], port)).await;
    }
}

fn setup_logger() {
    // create logs dir as fern does not appear to handle that itself
    if !std::path::Path::new("logs/").exists() {
        std::fs::create_dir("logs").expect("Failed to create logs/ directory");
    }

    let logging_level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}]{}[{}] {}",
                record.level(),
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("tubely", logging_level)
        .level_for("tubely_server", logging_level)
        .chain(std::io::stdout())
        .chain(fern::DateBased::new("logs/", "logs_%Y-%m-%d.log"))
        .apply()
        .expect("Failed to set up logging");
}
