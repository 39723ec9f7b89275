use appearance_common::{AssetId, BakeRegion, TextureQuality, UploadId};
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::raster::{PixelDigest, Raster};

/// A snapshot of one composite handed to the asset service.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub id: UploadId,
    pub region: BakeRegion,
    pub quality: TextureQuality,
    pub digest: PixelDigest,
    pub image: Raster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored(AssetId),
    Failed(String),
}

/// Completion record posted back to the owning pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCompletion {
    pub id: UploadId,
    pub region: BakeRegion,
    pub outcome: UploadOutcome,
}

/// One-shot handle that reports an upload's outcome. Safe to move to another thread.
#[derive(Debug)]
pub struct UploadCompleter {
    id: UploadId,
    region: BakeRegion,
    sender: Sender<UploadCompletion>,
}

impl UploadCompleter {
    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn region(&self) -> BakeRegion {
        self.region
    }

    pub fn complete(self, outcome: UploadOutcome) {
        let completion = UploadCompletion {
            id: self.id,
            region: self.region,
            outcome,
        };
        if self.sender.send(completion).is_err() {
            tracing::debug!(upload = %self.id, "upload owner gone; completion dropped");
        }
    }
}

/// The asset service collaborator. Requests are fire-and-forget.
pub trait AssetUploader {
    fn request_upload(&mut self, request: UploadRequest, completer: UploadCompleter);
}

/// Issues correlation ids and collects completions for the pump to drain.
#[derive(Debug)]
pub struct UploadQueue {
    sender: Sender<UploadCompletion>,
    receiver: Receiver<UploadCompletion>,
    next_id: u64,
}

impl Default for UploadQueue {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            next_id: 1,
        }
    }
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh id; ids are never reused.
    pub fn next_id(&mut self) -> UploadId {
        let id = UploadId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn completer(&self, id: UploadId, region: BakeRegion) -> UploadCompleter {
        UploadCompleter {
            id,
            region,
            sender: self.sender.clone(),
        }
    }

    /// Completions received so far, in arrival order.
    pub fn drain(&self) -> Vec<UploadCompletion> {
        self.receiver.try_iter().collect()
    }
}

/// In-process uploader that stores nothing and answers with fresh asset ids.
///
/// In deferred mode requests are held until released, which lets callers
/// observe the in-flight state.
#[derive(Debug, Default)]
pub struct LoopbackUploader {
    deferred: bool,
    fail_next: usize,
    held: Vec<(UploadRequest, UploadCompleter)>,
    requests: Vec<(UploadId, BakeRegion)>,
}

impl LoopbackUploader {
    /// Completes every request immediately.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// Fail the next `count` requests.
    pub fn fail_next(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Every request received, in order.
    pub fn requests(&self) -> &[(UploadId, BakeRegion)] {
        &self.requests
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Complete every held request.
    pub fn release_all(&mut self) -> usize {
        let held = std::mem::take(&mut self.held);
        let count = held.len();
        for (request, completer) in held {
            let outcome = self.outcome(&request);
            completer.complete(outcome);
        }
        count
    }

    fn outcome(&mut self, request: &UploadRequest) -> UploadOutcome {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            UploadOutcome::Failed(format!("loopback rejected {}", request.id))
        } else {
            UploadOutcome::Stored(AssetId::new())
        }
    }
}

impl AssetUploader for LoopbackUploader {
    fn request_upload(&mut self, request: UploadRequest, completer: UploadCompleter) {
        tracing::debug!(upload = %request.id, region = %request.region, digest = %request.digest, "loopback upload");
        self.requests.push((request.id, request.region));
        if self.deferred {
            self.held.push((request, completer));
        } else {
            let outcome = self.outcome(&request);
            completer.complete(outcome);
        }
    }
}
