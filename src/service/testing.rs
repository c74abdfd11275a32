use chrono::{DateTime, TimeZone, Utc};

use crate::{
    face::{FaceMatcher, image::png_data_url},
    model::user::{NewUser, User},
    store::Store,
};

/// Monday 2026-03-02 09:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Inserts a user directly, skipping password hashing.
pub async fn seed_user(store: &dyn Store, username: &str) -> User {
    store
        .create_user(NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: "unused".into(),
            full_name: format!("{username} Tester"),
            phone_number: None,
            is_admin: false,
        })
        .await
        .unwrap()
}

/// A user whose enrolled face is `png_data_url(seed)`.
pub async fn seed_user_with_face(
    store: &dyn Store,
    matcher: &dyn FaceMatcher,
    username: &str,
    seed: u8,
) -> User {
    let user = seed_user(store, username).await;
    let image = crate::face::FaceImage::from_data_url(&png_data_url(seed), usize::MAX / 2).unwrap();
    store
        .set_face_reference(user.id, &matcher.reference(&image).unwrap())
        .await
        .unwrap();
    store.find_user(user.id).await.unwrap().unwrap()
}
