use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::CallContext;
use super::upload::{PendingImage, UploadState};
use crate::proto::device_service_server::DeviceService;
use crate::proto::{
    CreateDeviceRequest, CreateDeviceResponse, Device, Filter, RateDeviceRequest,
    RateDeviceResponse, SearchDeviceRequest, SearchDeviceResponse, UploadImageRequest,
    UploadImageResponse,
};
use crate::store::{DeviceSink, DeviceStore, ImageStore, RatingStore};
use crate::{Error, Result};

const STREAM_BUFFER: usize = 16;

type SearchSender = mpsc::Sender<std::result::Result<SearchDeviceResponse, Status>>;
type RateSender = mpsc::Sender<std::result::Result<RateDeviceResponse, Status>>;

/// gRPC service for creating, searching, picturing and rating devices.
#[derive(Clone)]
pub struct DeviceServiceImpl {
    devices: Arc<dyn DeviceStore>,
    images: Arc<dyn ImageStore>,
    ratings: Arc<dyn RatingStore>,
}

impl DeviceServiceImpl {
    /// Creates the service over the given stores.
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        images: Arc<dyn ImageStore>,
        ratings: Arc<dyn RatingStore>,
    ) -> Self {
        Self {
            devices,
            images,
            ratings,
        }
    }

    /// Stores `device`, assigning an id when it has none, and returns the id.
    ///
    /// Nothing is stored once `ctx` is cancelled or past its deadline.
    pub async fn create(&self, ctx: &CallContext, mut device: Device) -> Result<String> {
        info!(device_id = %device.id, "received create device request");

        if device.id.is_empty() {
            device.id = Uuid::new_v4().to_string();
        } else {
            Uuid::parse_str(&device.id)
                .map_err(|e| Error::InvalidArgument(format!("device id is invalid: {e}")))?;
        }

        if let Err(err) = ctx.check() {
            warn!(device_id = %device.id, error = %err, "create device abandoned");
            return Err(err);
        }

        let id = self.devices.save(&device).await.map_err(|err| match err {
            Error::AlreadyExists(_) | Error::InvalidArgument(_) => err,
            other => Error::Internal(format!("cannot save device: {other}")),
        })?;

        info!(device_id = %id, "saved device");
        Ok(id)
    }

    /// Sends every device matching `filter` down `tx` as it is found.
    pub async fn search(&self, filter: &Filter, tx: SearchSender) -> Result<usize> {
        let mut sink = ResponseSink { tx, sent: 0 };
        self.devices.search(filter, &mut sink).await?;
        Ok(sink.sent)
    }

    /// Drives an upload from `inbound` to completion and stores the image.
    pub async fn upload<S>(&self, ctx: &CallContext, mut inbound: S) -> Result<UploadImageResponse>
    where
        S: Stream<Item = std::result::Result<UploadImageRequest, Status>> + Unpin + Send,
    {
        let mut state = UploadState::AwaitingInfo;

        loop {
            state = match state {
                UploadState::ValidatingInfo(info) => {
                    info!(
                        device_id = %info.device_id,
                        image_type = %info.image_type,
                        "received upload image request"
                    );

                    if self.devices.find(&info.device_id).await.is_none() {
                        return Err(Error::NotFound(format!(
                            "device '{}' does not exist",
                            info.device_id
                        )));
                    }

                    UploadState::ReceivingChunks(PendingImage::new(info))
                }
                UploadState::Finalizing(pending) => return self.store_image(pending).await,
                state => {
                    ctx.check()?;

                    match inbound.next().await {
                        Some(Ok(message)) => state.receive(message)?,
                        None => {
                            debug!("no more image data");
                            state.end_of_input()?
                        }
                        Some(Err(status)) => {
                            return Err(Error::Internal(format!(
                                "cannot receive upload message: {}",
                                status.message()
                            )))
                        }
                    }
                }
            };
        }
    }

    async fn store_image(&self, pending: PendingImage) -> Result<UploadImageResponse> {
        let size = u32::try_from(pending.data.len()).unwrap_or(u32::MAX);

        let id = self
            .images
            .save(&pending.info.device_id, &pending.info.image_type, &pending.data)
            .await
            .map_err(|e| Error::Internal(format!("cannot save image to the store: {e}")))?;

        info!(image_id = %id, size, "saved image");
        Ok(UploadImageResponse { id, size })
    }

    /// Rates devices from `inbound`, answering each request on `tx` in order.
    pub async fn rate<S>(&self, ctx: &CallContext, mut inbound: S, tx: &RateSender) -> Result<()>
    where
        S: Stream<Item = std::result::Result<RateDeviceRequest, Status>> + Unpin + Send,
    {
        loop {
            if tx.is_closed() {
                ctx.cancel();
            }
            ctx.check()?;

            let request = match inbound.next().await {
                Some(Ok(request)) => request,
                None => {
                    debug!("no more ratings");
                    return Ok(());
                }
                Some(Err(status)) => {
                    return Err(Error::Internal(format!(
                        "cannot receive rating: {}",
                        status.message()
                    )))
                }
            };

            debug!(device_id = %request.device_id, score = request.score, "received rating");

            if self.devices.find(&request.device_id).await.is_none() {
                return Err(Error::NotFound(format!(
                    "device '{}' does not exist",
                    request.device_id
                )));
            }

            let rating = self
                .ratings
                .add(&request.device_id, request.score)
                .await
                .map_err(|e| Error::Internal(format!("cannot add rating: {e}")))?;

            let response = RateDeviceResponse {
                device_id: request.device_id,
                rated_count: rating.count,
                average_score: rating.average(),
            };

            tx.send(Ok(response)).await.map_err(|_| {
                ctx.cancel();
                Error::Cancelled
            })?;
        }
    }
}

struct ResponseSink {
    tx: SearchSender,
    sent: usize,
}

#[tonic::async_trait]
impl DeviceSink for ResponseSink {
    async fn visit(&mut self, device: Device) -> Result<()> {
        let id = device.id.clone();

        self.tx
            .send(Ok(SearchDeviceResponse {
                device: Some(device),
            }))
            .await
            .map_err(|_| Error::Cancelled)?;

        self.sent += 1;
        debug!(device_id = %id, "sent device");
        Ok(())
    }
}

#[tonic::async_trait]
impl DeviceService for DeviceServiceImpl {
    type SearchDeviceStream = ReceiverStream<std::result::Result<SearchDeviceResponse, Status>>;
    type RateDeviceStream = ReceiverStream<std::result::Result<RateDeviceResponse, Status>>;

    async fn create_device(
        &self,
        request: Request<CreateDeviceRequest>,
    ) -> std::result::Result<Response<CreateDeviceResponse>, Status> {
        let start = Instant::now();
        counter!("catalog.create_device.requests").increment(1);

        let ctx = CallContext::from_metadata(request.metadata());
        let device = request
            .into_inner()
            .device
            .ok_or_else(|| Status::invalid_argument("device is required"))?;

        let result = self.create(&ctx, device).await;

        histogram!("catalog.create_device.duration").record(start.elapsed().as_secs_f64());
        if result.is_err() {
            counter!("catalog.create_device.failure").increment(1);
        }

        Ok(Response::new(CreateDeviceResponse { id: result? }))
    }

    async fn search_device(
        &self,
        request: Request<SearchDeviceRequest>,
    ) -> std::result::Result<Response<Self::SearchDeviceStream>, Status> {
        counter!("catalog.search_device.requests").increment(1);

        let filter = request.into_inner().filter.unwrap_or_default();
        info!(?filter, "received search device request");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let service = self.clone();

        tokio::spawn(async move {
            match service.search(&filter, tx.clone()).await {
                Ok(sent) => debug!(sent, "search finished"),
                Err(err) => {
                    warn!(error = %err, "search aborted");
                    let _ = tx.send(Err(err.into())).await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> std::result::Result<Response<UploadImageResponse>, Status> {
        let start = Instant::now();
        counter!("catalog.upload_image.requests").increment(1);

        let ctx = CallContext::from_metadata(request.metadata());
        let result = self.upload(&ctx, request.into_inner()).await;

        histogram!("catalog.upload_image.duration").record(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            counter!("catalog.upload_image.failure").increment(1);
            warn!(error = %err, "upload aborted");
        }

        Ok(Response::new(result?))
    }

    async fn rate_device(
        &self,
        request: Request<Streaming<RateDeviceRequest>>,
    ) -> std::result::Result<Response<Self::RateDeviceStream>, Status> {
        counter!("catalog.rate_device.requests").increment(1);

        let ctx = CallContext::from_metadata(request.metadata());
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let service = self.clone();

        tokio::spawn(async move {
            if let Err(err) = service.rate(&ctx, inbound, &tx).await {
                warn!(error = %err, "rating stream aborted");
                let _ = tx.send(Err(err.into())).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
