use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    auth::auth::ClientInfo,
    error::ServiceError,
    face::{FaceImage, FaceMatcher},
    model::{
        audit::{EventType, Severity},
        user::User,
    },
    service::audit,
    store::Store,
};

/// What the browser sends: a data URL plus the result of its own face detection.
#[derive(Debug, Clone, Copy)]
pub struct Capture<'a> {
    pub data_url: &'a str,
    pub face_detected: Option<bool>,
}

/// A capture that matched the enrolled reference.
#[derive(Debug)]
pub struct FaceMatch {
    pub image: FaceImage,
    pub score: f64,
}

pub struct FaceGate<'a> {
    pub store: &'a dyn Store,
    pub matcher: &'a dyn FaceMatcher,
    pub max_image_bytes: usize,
}

impl FaceGate<'_> {
    fn decode(&self, capture: Capture<'_>) -> Result<FaceImage, ServiceError> {
        if capture.face_detected == Some(false) {
            return Err(ServiceError::NoFaceDetected);
        }
        FaceImage::from_data_url(capture.data_url, self.max_image_bytes)
    }

    /// Enrolls (or re-enrolls) the user's face.
    pub async fn register(
        &self,
        user: &User,
        capture: Capture<'_>,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let image = self.decode(capture)?;

        let reference = self.matcher.reference(&image)?;
        self.store.set_face_reference(user.id, &reference).await?;

        info!(
            user_id = user.id,
            policy = self.matcher.name(),
            mime = %image.mime,
            "Face registered"
        );
        audit::record_event(
            self.store,
            Some(user.id),
            EventType::FaceRegistered,
            Severity::Info,
            "Face recognition enrolled",
            client,
            now,
        )
        .await;

        Ok(())
    }

    /// Compares a capture against the enrolled reference. Rejections are audited.
    pub async fn verify(
        &self,
        user: &User,
        capture: Capture<'_>,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<FaceMatch, ServiceError> {
        let reference = match (&user.face_reference, user.face_registered) {
            (Some(reference), true) => reference,
            _ => return Err(ServiceError::FaceNotRegistered),
        };

        let image = self.decode(capture)?;
        let score = self.matcher.score(reference, &image)?;
        debug!(user_id = user.id, score, threshold = self.matcher.threshold(), "Face compared");

        if !self.matcher.accept(score) {
            audit::record_event(
                self.store,
                Some(user.id),
                EventType::FaceFailure,
                Severity::Warning,
                format!("Face verification failed (similarity {:.2})", score),
                client,
                now,
            )
            .await;
            return Err(ServiceError::FaceMismatch);
        }

        Ok(FaceMatch { image, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        face::{FacePolicy, image::png_data_url, matcher},
        model::audit::EventFilter,
        service::testing::{seed_user, t0},
        store::MemoryStore,
    };

    const MAX: usize = 5 * 1024 * 1024;

    fn capture(data_url: &str) -> Capture<'_> {
        Capture { data_url, face_detected: None }
    }

    #[actix_web::test]
    async fn enrolled_face_verifies_and_other_face_fails() {
        let store = MemoryStore::new();
        let matcher = matcher::from_config(FacePolicy::Bytes, 0.95);
        let gate = FaceGate { store: &store, matcher: matcher.as_ref(), max_image_bytes: MAX };
        let client = ClientInfo::default();
        let user = seed_user(&store, "face_a").await;

        gate.register(&user, capture(&png_data_url(1)), &client, t0()).await.unwrap();
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(user.face_registered);

        let ok = gate
            .verify(
                &user,
                Capture { data_url: &png_data_url(1), face_detected: Some(true) },
                &client,
                t0(),
            )
            .await
            .unwrap();
        assert_eq!(ok.score, 1.0);

        let err = gate
            .verify(&user, capture(&png_data_url(2)), &client, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::FaceMismatch));

        let events = store
            .list_security_events(&EventFilter {
                event_type: Some("face_failure".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[actix_web::test]
    async fn verification_needs_enrollment() {
        let store = MemoryStore::new();
        let matcher = matcher::from_config(FacePolicy::Bits, 0.95);
        let gate = FaceGate { store: &store, matcher: matcher.as_ref(), max_image_bytes: MAX };
        let user = seed_user(&store, "face_b").await;

        let err = gate
            .verify(&user, capture(&png_data_url(1)), &ClientInfo::default(), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::FaceNotRegistered));
    }

    #[actix_web::test]
    async fn bad_captures_are_rejected_before_enrollment() {
        let store = MemoryStore::new();
        let matcher = matcher::from_config(FacePolicy::Bytes, 0.95);
        let gate = FaceGate { store: &store, matcher: matcher.as_ref(), max_image_bytes: MAX };
        let client = ClientInfo::default();
        let user = seed_user(&store, "face_c").await;

        let err = gate
            .register(&user, capture("data:image/png;base64,AAAA"), &client, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoFaceOrInvalidImage));

        let png = png_data_url(1);
        let err = gate
            .register(&user, Capture { data_url: &png, face_detected: Some(false) }, &client, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoFaceDetected));

        assert!(!store.find_user(user.id).await.unwrap().unwrap().face_registered);
    }

    #[actix_web::test]
    async fn perceptual_policy_refuses_undecodable_enrollment() {
        let store = MemoryStore::new();
        let matcher = matcher::from_config(FacePolicy::AverageHash, 0.8);
        let gate = FaceGate { store: &store, matcher: matcher.as_ref(), max_image_bytes: MAX };
        let user = seed_user(&store, "face_d").await;

        // passes the header checks but is not a real PNG
        let err = gate
            .register(&user, capture(&png_data_url(1)), &ClientInfo::default(), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoFaceOrInvalidImage));
        assert!(!store.find_user(user.id).await.unwrap().unwrap().face_registered);
    }
}
