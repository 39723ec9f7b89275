use appearance_common::{AssetId, TextureQuality, UploadId};

use crate::compose::Composite;
use crate::raster::{PixelDigest, Raster};
use crate::upload::UploadOutcome;

/// Lifecycle of a layer set's baked output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Output matches the inputs and the last successful upload.
    Clean,
    /// An input changed; recomposite on the next pump.
    NeedsUpdate,
    /// Fresh pixels that have not been uploaded.
    Composited,
    UploadPending,
}

/// The last upload the asset service accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRecord {
    pub id: UploadId,
    pub digest: PixelDigest,
    pub quality: TextureQuality,
    pub asset: AssetId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    id: UploadId,
    digest: PixelDigest,
    quality: TextureQuality,
}

/// What to do with a composited buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// Same pixels (and no better quality) than the last upload.
    Unchanged,
    /// Preview pixels while preview uploads are disabled.
    WaitForFinal,
    /// An upload is already outstanding; changes coalesce behind it.
    InFlight,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Not the outstanding upload (cancelled or superseded); dropped.
    Stale,
    Stored(AssetId),
    Failed(String),
}

/// Fixed-size composite buffer plus its upload bookkeeping.
///
/// At most one upload is outstanding at a time. Changes that arrive while one
/// is in flight leave the buffer in `NeedsUpdate`/`Composited`, so exactly one
/// follow-up upload is issued once the outstanding one resolves.
#[derive(Debug, Clone)]
pub struct LayerSetBuffer {
    width: u32,
    height: u32,
    state: BufferState,
    composite: Option<Composite>,
    in_flight: Option<InFlight>,
    last_uploaded: Option<UploadRecord>,
    retry_hold: bool,
}

impl LayerSetBuffer {
    /// A new buffer has never been composited and starts in `NeedsUpdate`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: BufferState::NeedsUpdate,
            composite: None,
            in_flight: None,
            last_uploaded: None,
            retry_hold: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn composite(&self) -> Option<&Composite> {
        self.composite.as_ref()
    }

    /// RGBA8 bytes of the current composite, for the renderer.
    pub fn pixels(&self) -> Option<&[u8]> {
        self.composite.as_ref().map(|c| c.image.as_bytes())
    }

    pub fn in_flight(&self) -> Option<UploadId> {
        self.in_flight.map(|f| f.id)
    }

    pub fn last_uploaded(&self) -> Option<&UploadRecord> {
        self.last_uploaded.as_ref()
    }

    /// Held after a failed upload until [`retry`](Self::retry) or a new change.
    pub fn is_held(&self) -> bool {
        self.retry_hold
    }

    /// Any state may re-enter `NeedsUpdate`, including while an upload is out.
    pub fn mark_dirty(&mut self) {
        self.state = BufferState::NeedsUpdate;
        self.retry_hold = false;
    }

    pub fn needs_compose(&self) -> bool {
        self.state == BufferState::NeedsUpdate && !self.retry_hold
    }

    pub fn store_composite(&mut self, composite: Composite) -> &Composite {
        self.state = BufferState::Composited;
        self.composite.insert(composite)
    }

    pub fn upload_decision(&self, upload_preview: bool) -> UploadDecision {
        let Some(composite) = &self.composite else {
            return UploadDecision::Unchanged;
        };
        if self.in_flight.is_some() {
            return UploadDecision::InFlight;
        }
        if composite.quality == TextureQuality::Preview && !upload_preview {
            return UploadDecision::WaitForFinal;
        }
        match &self.last_uploaded {
            Some(last)
                if last.digest == composite.digest
                    && !(last.quality == TextureQuality::Preview
                        && composite.quality == TextureQuality::Final) =>
            {
                UploadDecision::Unchanged
            }
            _ => UploadDecision::Ready,
        }
    }

    /// `Composited -> Clean` when nothing needs uploading.
    pub fn mark_clean(&mut self) {
        if self.state == BufferState::Composited {
            self.state = BufferState::Clean;
        }
    }

    /// Whether [`begin_upload`](Self::begin_upload) would proceed.
    pub fn can_begin_upload(&self) -> bool {
        self.state == BufferState::Composited && self.in_flight.is_none() && self.composite.is_some()
    }

    /// `Composited -> UploadPending`, returning a snapshot of the pixels.
    ///
    /// Returns `None` unless the buffer is composited with nothing in flight.
    pub fn begin_upload(&mut self, id: UploadId) -> Option<(Raster, PixelDigest, TextureQuality)> {
        if !self.can_begin_upload() {
            return None;
        }
        let composite = self.composite.as_ref()?;
        self.in_flight = Some(InFlight {
            id,
            digest: composite.digest,
            quality: composite.quality,
        });
        self.state = BufferState::UploadPending;
        Some((composite.image.clone(), composite.digest, composite.quality))
    }

    /// Apply a completion keyed by correlation id.
    ///
    /// A failure while nothing newer is queued returns to `NeedsUpdate` held;
    /// a failure behind a newer change lets that change drive the retry.
    pub fn complete(&mut self, id: UploadId, outcome: UploadOutcome) -> CompletionResult {
        let flight = match self.in_flight {
            Some(f) if f.id == id => f,
            _ => return CompletionResult::Stale,
        };
        self.in_flight = None;
        let pending = self.state == BufferState::UploadPending;
        match outcome {
            UploadOutcome::Stored(asset) => {
                self.last_uploaded = Some(UploadRecord {
                    id,
                    digest: flight.digest,
                    quality: flight.quality,
                    asset,
                });
                if pending {
                    self.state = BufferState::Clean;
                }
                CompletionResult::Stored(asset)
            }
            UploadOutcome::Failed(reason) => {
                if pending {
                    self.state = BufferState::NeedsUpdate;
                    self.retry_hold = true;
                }
                CompletionResult::Failed(reason)
            }
        }
    }

    /// Release a failure hold. Returns whether one was held.
    pub fn retry(&mut self) -> bool {
        std::mem::replace(&mut self.retry_hold, false)
    }

    /// Forget the outstanding upload and the upload history, then re-queue.
    /// Returns the id that is now stale.
    pub fn force_rebake(&mut self) -> Option<UploadId> {
        let stale = self.in_flight.take().map(|f| f.id);
        self.last_uploaded = None;
        self.mark_dirty();
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Rgba8;

    fn composite(color: Rgba8, quality: TextureQuality) -> Composite {
        let image = Raster::filled(2, 2, color);
        let digest = image.digest();
        Composite {
            image,
            quality,
            digest,
            morph_mask: None,
        }
    }

    fn uploaded() -> LayerSetBuffer {
        let mut b = LayerSetBuffer::new(2, 2);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        b.begin_upload(UploadId(1)).unwrap();
        b.complete(UploadId(1), UploadOutcome::Stored(AssetId::new()));
        b
    }

    #[test]
    fn full_cycle_reaches_clean() {
        let mut b = LayerSetBuffer::new(2, 2);
        assert!(b.needs_compose());
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        assert_eq!(b.state(), BufferState::Composited);
        assert_eq!(b.upload_decision(false), UploadDecision::Ready);
        let (snapshot, _, _) = b.begin_upload(UploadId(1)).unwrap();
        assert_eq!(snapshot.width(), 2);
        assert_eq!(b.state(), BufferState::UploadPending);
        assert!(matches!(
            b.complete(UploadId(1), UploadOutcome::Stored(AssetId::new())),
            CompletionResult::Stored(_)
        ));
        assert_eq!(b.state(), BufferState::Clean);
        assert!(b.last_uploaded().is_some());
    }

    #[test]
    fn identical_recomposite_is_unchanged() {
        let mut b = uploaded();
        b.mark_dirty();
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        assert_eq!(b.upload_decision(false), UploadDecision::Unchanged);
        b.mark_clean();
        assert_eq!(b.state(), BufferState::Clean);
    }

    #[test]
    fn changes_during_flight_coalesce() {
        let mut b = LayerSetBuffer::new(2, 2);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        b.begin_upload(UploadId(1)).unwrap();

        b.mark_dirty();
        b.store_composite(composite(Rgba8::new(1, 2, 3, 4), TextureQuality::Final));
        b.mark_dirty();
        b.store_composite(composite(Rgba8::new(5, 6, 7, 8), TextureQuality::Final));
        assert_eq!(b.upload_decision(false), UploadDecision::InFlight);
        assert!(!b.can_begin_upload());
        assert!(b.begin_upload(UploadId(2)).is_none());

        b.complete(UploadId(1), UploadOutcome::Stored(AssetId::new()));
        assert_eq!(b.state(), BufferState::Composited);
        assert_eq!(b.upload_decision(false), UploadDecision::Ready);
        assert!(b.begin_upload(UploadId(2)).is_some());
        assert_eq!(b.in_flight(), Some(UploadId(2)));
    }

    #[test]
    fn failure_holds_until_retry_or_change() {
        let mut b = LayerSetBuffer::new(2, 2);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        b.begin_upload(UploadId(1)).unwrap();
        let result = b.complete(UploadId(1), UploadOutcome::Failed("503".into()));
        assert_eq!(result, CompletionResult::Failed("503".into()));
        assert_eq!(b.state(), BufferState::NeedsUpdate);
        assert!(b.is_held());
        assert!(!b.needs_compose());
        assert!(b.retry());
        assert!(b.needs_compose());

        b.complete(UploadId(1), UploadOutcome::Failed("again".into()));
        assert!(!b.is_held());
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut b = LayerSetBuffer::new(2, 2);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        b.begin_upload(UploadId(7)).unwrap();
        assert_eq!(b.force_rebake(), Some(UploadId(7)));
        assert_eq!(
            b.complete(UploadId(7), UploadOutcome::Stored(AssetId::new())),
            CompletionResult::Stale
        );
        assert!(b.last_uploaded().is_none());
        assert_eq!(b.state(), BufferState::NeedsUpdate);
    }

    #[test]
    fn preview_waits_then_final_upgrades() {
        let mut b = LayerSetBuffer::new(2, 2);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Preview));
        assert_eq!(b.upload_decision(false), UploadDecision::WaitForFinal);
        assert_eq!(b.upload_decision(true), UploadDecision::Ready);

        b.begin_upload(UploadId(1)).unwrap();
        b.complete(UploadId(1), UploadOutcome::Stored(AssetId::new()));
        b.mark_dirty();
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        assert_eq!(b.upload_decision(true), UploadDecision::Ready);
    }

    #[test]
    fn rebake_forgets_history() {
        let mut b = uploaded();
        assert_eq!(b.force_rebake(), None);
        b.store_composite(composite(Rgba8::WHITE, TextureQuality::Final));
        assert_eq!(b.upload_decision(false), UploadDecision::Ready);
    }
}
