diesel::table! {
    video (id) {
        id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        title -> Varchar,
        description -> Nullable<Varchar>,
        thumbnail_url -> Nullable<Varchar>,
        video_url -> Nullable<Varchar>,
        owner_id -> Uuid,
    }
}
