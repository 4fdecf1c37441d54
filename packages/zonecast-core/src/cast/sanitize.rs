//! Payload size reduction for the custom channel.
//!
//! The transport rejects frames above its message ceiling, so oversized
//! payloads are shrunk in a strict priority order: cheap text metadata first,
//! then the artist image list, and only as a last resort the inline album
//! art. Each step re-measures the serialized message and later steps are
//! skipped once the payload fits.

use super::types::{MessageKind, OutboundMessage, PlaybackPayload};

/// Shrinks `payload` until its kind-tagged serialized form fits `limit` bytes.
///
/// If every reduction step is exhausted and the message is still oversized,
/// the trimmed message is returned as-is: the receiver may still accept it,
/// and dropping the update entirely would be worse than a refused frame.
pub fn sanitize(kind: MessageKind, payload: PlaybackPayload, limit: usize) -> OutboundMessage {
    let mut message = OutboundMessage { kind, payload };

    let initial = message.serialized_len();
    if initial <= limit {
        return message;
    }
    log::debug!(
        "[Cast] payload too large ({} bytes > {}), trimming",
        initial,
        limit
    );

    // Step 2: collapse the text blocks to their leading lines.
    if let Some(now_playing) = message.payload.now_playing.as_mut() {
        if let Some(three_line) = now_playing.three_line.as_mut() {
            three_line.line2 = None;
            three_line.line3 = None;
        }
        if let Some(two_line) = now_playing.two_line.as_mut() {
            two_line.line3 = None;
        }
    }
    if message.serialized_len() <= limit {
        log::debug!(
            "[Cast] collapsed text metadata, payload now {} bytes",
            message.serialized_len()
        );
        return message;
    }

    // Step 3: drop the text blocks entirely.
    if let Some(now_playing) = message.payload.now_playing.as_mut() {
        now_playing.one_line = None;
        now_playing.two_line = None;
        now_playing.three_line = None;
        if message.serialized_len() <= limit {
            log::debug!(
                "[Cast] removed text metadata, payload now {} bytes",
                message.serialized_len()
            );
            return message;
        }
    }

    // Step 4: keep at most two artist images.
    if message.payload.artist_images.len() > 2 {
        log::debug!(
            "[Cast] truncating artist images from {} to 2",
            message.payload.artist_images.len()
        );
        message.payload.artist_images.truncate(2);
    }
    if message.serialized_len() <= limit {
        return message;
    }

    // Step 5: no artist images at all.
    if !message.payload.artist_images.is_empty() {
        message.payload.artist_images.clear();
    }
    if message.serialized_len() <= limit {
        log::debug!(
            "[Cast] removed artist images, payload now {} bytes",
            message.serialized_len()
        );
        return message;
    }

    // Step 6: last resort, drop the inline album art.
    if message.payload.image_data.is_some() {
        message.payload.image_data = None;
        if message.serialized_len() <= limit {
            log::warn!(
                "[Cast] dropped inline album art to fit size ceiling, payload now {} bytes",
                message.serialized_len()
            );
            return message;
        }
    }

    // Step 7: best effort. Never an error.
    log::warn!(
        "[Cast] payload still {} bytes after trimming, sending anyway",
        message.serialized_len()
    );
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::types::{NowPlaying, TextLines};

    fn three_line(line1: &str, line2: &str, line3: &str) -> TextLines {
        TextLines {
            line1: line1.to_string(),
            line2: Some(line2.to_string()),
            line3: Some(line3.to_string()),
        }
    }

    fn payload_with_lines(filler: usize) -> PlaybackPayload {
        PlaybackPayload {
            zone_name: Some("Kitchen".into()),
            now_playing: Some(NowPlaying {
                three_line: Some(three_line("Track", &"a".repeat(filler), &"c".repeat(filler))),
                two_line: Some(TextLines {
                    line1: "Track".into(),
                    line2: Some("Artist".into()),
                    line3: Some("Album".into()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn len_of(kind: MessageKind, payload: &PlaybackPayload) -> usize {
        OutboundMessage {
            kind,
            payload: payload.clone(),
        }
        .serialized_len()
    }

    #[test]
    fn payload_within_limit_is_untouched() {
        let payload = payload_with_lines(10);
        let baseline = payload.clone();
        let message = sanitize(MessageKind::NowPlaying, payload, 64 * 1024);
        assert_eq!(message.payload, baseline);
    }

    #[test]
    fn collapses_three_line_before_touching_images() {
        let mut payload = payload_with_lines(400);
        payload.artist_images = vec!["https://img.example/a.jpg".into()];
        let limit = len_of(MessageKind::NowPlaying, &payload) - 100;

        let message = sanitize(MessageKind::NowPlaying, payload, limit);
        let now_playing = message.payload.now_playing.as_ref().unwrap();
        let collapsed = now_playing.three_line.as_ref().unwrap();
        assert_eq!(collapsed.line1, "Track");
        assert!(collapsed.line2.is_none());
        assert!(collapsed.line3.is_none());
        // Two-line keeps its first two lines.
        let two = now_playing.two_line.as_ref().unwrap();
        assert_eq!(two.line2.as_deref(), Some("Artist"));
        assert!(two.line3.is_none());
        // Images untouched when collapsing was enough.
        assert_eq!(message.payload.artist_images.len(), 1);
        assert!(message.serialized_len() <= limit);
    }

    #[test]
    fn deletes_text_blocks_before_any_image() {
        let mut payload = payload_with_lines(0);
        payload.now_playing.as_mut().unwrap().two_line = Some(TextLines {
            line1: "t".repeat(300),
            line2: Some("u".repeat(300)),
            line3: None,
        });
        payload.artist_images = vec!["https://img.example/a.jpg".into(); 4];
        // Small enough that only removing the blocks entirely can fit.
        let limit = 350;

        let message = sanitize(MessageKind::NowPlaying, payload, limit);
        let now_playing = message.payload.now_playing.as_ref().unwrap();
        assert!(now_playing.one_line.is_none());
        assert!(now_playing.two_line.is_none());
        assert!(now_playing.three_line.is_none());
        assert_eq!(message.payload.artist_images.len(), 4);
        assert!(message.serialized_len() <= limit);
    }

    #[test]
    fn truncates_then_empties_artist_images() {
        let image = format!("https://img.example/{}.jpg", "x".repeat(200));
        let mut payload = PlaybackPayload {
            artist_images: vec![image.clone(); 4],
            ..Default::default()
        };
        // Fits with two images, not with four.
        let limit = len_of(MessageKind::State, &payload) - 2 * (image.len() + 3);
        let message = sanitize(MessageKind::State, payload.clone(), limit);
        assert_eq!(message.payload.artist_images.len(), 2);
        assert!(message.serialized_len() <= limit);

        // Fits only with no images at all.
        payload.artist_images = vec![image; 4];
        let message = sanitize(MessageKind::State, payload, 80);
        assert!(message.payload.artist_images.is_empty());
        assert!(message.serialized_len() <= 80);
    }

    #[test]
    fn inline_art_dropped_only_as_last_resort() {
        let payload = PlaybackPayload {
            image_data: Some(format!("data:image/jpeg;base64,{}", "A".repeat(2000))),
            artist_images: vec!["https://img.example/a.jpg".into(); 3],
            ..Default::default()
        };
        let message = sanitize(MessageKind::NowPlaying, payload, 100);
        assert!(message.payload.artist_images.is_empty());
        assert!(message.payload.image_data.is_none());
        assert!(message.serialized_len() <= 100);
    }

    #[test]
    fn exhausted_reduction_returns_best_effort() {
        let payload = PlaybackPayload {
            zone_name: Some("z".repeat(500)),
            ..Default::default()
        };
        // Nothing the ladder removes can shrink an oversized zone name.
        let message = sanitize(MessageKind::State, payload, 64);
        assert!(message.serialized_len() > 64);
        assert_eq!(message.payload.zone_name.as_ref().unwrap().len(), 500);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut payload = payload_with_lines(300);
        payload.artist_images = vec!["https://img.example/a.jpg".into(); 4];
        payload.image_data = Some(format!("data:image/jpeg;base64,{}", "A".repeat(600)));

        for limit in [100usize, 400, 800, 2048] {
            let once = sanitize(MessageKind::NowPlaying, payload.clone(), limit);
            let twice = sanitize(MessageKind::NowPlaying, once.payload.clone(), limit);
            assert_eq!(once, twice, "not idempotent at limit {limit}");
        }
    }
}
