//! State machine for the client-streaming image upload.
//!
//! ```text
//! AwaitingInfo --info--> ValidatingInfo --device found--> ReceivingChunks
//!                                                         |  ^
//!                                                         +--+ chunk
//! ReceivingChunks --end of input--> Finalizing --saved--> response
//! ```
//!
//! Any other message, or a buffer growing past [`MAX_IMAGE_SIZE`], ends the
//! upload with an error and nothing is written.

use crate::proto::upload_image_request::Data;
use crate::proto::{ImageInfo, UploadImageRequest};
use crate::{Error, Result};

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// Image bytes collected so far, with the info they belong to.
#[derive(Debug)]
pub struct PendingImage {
    /// Device and type announced by the first message.
    pub info: ImageInfo,
    /// Concatenated chunks.
    pub data: Vec<u8>,
}

impl PendingImage {
    /// Starts an empty buffer for `info`.
    pub fn new(info: ImageInfo) -> Self {
        Self {
            info,
            data: Vec::new(),
        }
    }
}

/// Where an upload currently stands.
#[derive(Debug)]
pub enum UploadState {
    /// Waiting for the message naming device and image type.
    AwaitingInfo,
    /// Info received; the device has not been looked up yet.
    ValidatingInfo(ImageInfo),
    /// Accepting chunks.
    ReceivingChunks(PendingImage),
    /// Input ended; the image is ready to be stored.
    Finalizing(PendingImage),
}

impl UploadState {
    /// Applies one inbound message.
    pub fn receive(self, message: UploadImageRequest) -> Result<Self> {
        match (self, message.data) {
            (Self::AwaitingInfo, Some(Data::Info(info))) => Ok(Self::ValidatingInfo(info)),
            (Self::AwaitingInfo, _) => Err(Error::InvalidArgument(
                "first upload message must carry image info".to_string(),
            )),
            (Self::ReceivingChunks(mut pending), Some(Data::ChunkData(chunk))) => {
                let size = pending.data.len() + chunk.len();
                if size > MAX_IMAGE_SIZE {
                    return Err(Error::InvalidArgument(format!(
                        "image is too large: {size} > {MAX_IMAGE_SIZE} bytes"
                    )));
                }

                pending.data.extend_from_slice(&chunk);
                Ok(Self::ReceivingChunks(pending))
            }
            (Self::ReceivingChunks(_), _) => Err(Error::InvalidArgument(
                "expected an image chunk".to_string(),
            )),
            (state, _) => Err(Error::Internal(format!(
                "upload cannot receive in state {}",
                state.name()
            ))),
        }
    }

    /// Applies the end of the client's input.
    pub fn end_of_input(self) -> Result<Self> {
        match self {
            Self::ReceivingChunks(pending) => Ok(Self::Finalizing(pending)),
            Self::AwaitingInfo => Err(Error::InvalidArgument(
                "upload ended before image info".to_string(),
            )),
            state => Err(Error::Internal(format!(
                "upload cannot end in state {}",
                state.name()
            ))),
        }
    }

    /// Short state name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingInfo => "awaiting-info",
            Self::ValidatingInfo(_) => "validating-info",
            Self::ReceivingChunks(_) => "receiving-chunks",
            Self::Finalizing(_) => "finalizing",
        }
    }
}
