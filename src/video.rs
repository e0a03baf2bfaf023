use async_trait::async_trait;
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::{
    AsyncPgConnection, RunQueryDsl,
    pooled_connection::{
        AsyncDieselConnectionManager,
        deadpool::{Object, Pool},
    },
};
use uuid::Uuid;

use crate::{error::Error, model::Video, schema::video};

/// Store holding the video records. Uploads only ever read a record and write back its
/// URL columns.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, id: Uuid) -> Result<Video, Error>;

    /// Persists the `thumbnail_url` and `video_url` of the given video and returns the
    /// stored record. Fails if the record no longer exists.
    async fn update_video(&self, video: &Video) -> Result<Video, Error>;
}

pub struct PgVideoRepository {
    pool: Pool<AsyncPgConnection>,
}

impl PgVideoRepository {
    pub fn new(database_url: &str, max_connections: usize) -> Result<Self, Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_connections)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to initialise connection pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn acquire_db_connection(&self) -> Result<Object<AsyncPgConnection>, Error> {
        self.pool.get().await.map_err(|e| {
            log::error!("Failed to acquire database connection: {e}");
            Error::DatabaseConnectionError
        })
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn get_video(&self, id: Uuid) -> Result<Video, Error> {
        let mut connection = self.acquire_db_connection().await?;
        video::table
            .filter(video::id.eq(id))
            .get_result::<Video>(&mut connection)
            .await
            .optional()?
            .ok_or(Error::InaccessibleVideoError(id))
    }

    async fn update_video(&self, video: &Video) -> Result<Video, Error> {
        let mut connection = self.acquire_db_connection().await?;
        diesel::update(video::table.filter(video::id.eq(video.id)))
            .set((
                video::thumbnail_url.eq(video.thumbnail_url.clone()),
                video::video_url.eq(video.video_url.clone()),
                video::updated_at.eq(Utc::now()),
            ))
            .get_result::<Video>(&mut connection)
            .await
            .optional()?
            .ok_or_else(|| Error::QueryError(format!("video {} no longer exists", video.id)))
    }
}
