use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use device_catalog::proto::auth_service_client::AuthServiceClient;
use device_catalog::proto::device_service_client::DeviceServiceClient;
use device_catalog::proto::memory::Unit;
use device_catalog::proto::upload_image_request::Data;
use device_catalog::proto::{
    CreateDeviceRequest, Filter, ImageInfo, LoginRequest, Memory, RateDeviceRequest,
    SearchDeviceRequest, UploadImageRequest,
};
use device_catalog::sample;
use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::{Request, Status};

const CHUNK_SIZE: usize = 1024;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Device catalog client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[arg(short, long, default_value = "admin1")]
    username: String,

    #[arg(short, long, default_value = "secret")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the access token
    Login,

    /// Create random sample devices
    Create {
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Stream devices matching a filter
    Search {
        #[arg(long, default_value = "3000")]
        max_price: f64,

        #[arg(long, default_value = "4")]
        min_cores: u32,

        #[arg(long, default_value = "2.5")]
        min_ghz: f64,

        #[arg(long, default_value = "8", help = "Minimum RAM in gigabytes")]
        min_ram_gb: u64,
    },

    /// Create a sample device and upload an image for it
    Upload {
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Create sample devices and rate each of them
    Rate {
        #[arg(short, long, default_value = "3")]
        count: usize,
    },
}

type AuthedClient = DeviceServiceClient<
    InterceptedService<Channel, Box<dyn FnMut(Request<()>) -> Result<Request<()>, Status> + Send>>,
>;

async fn connect(server: &str, token: &str) -> Result<AuthedClient, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(server.to_string())?
        .timeout(Duration::from_secs(5))
        .connect()
        .await?;

    let bearer: MetadataValue<_> = format!("Bearer {token}").parse()?;
    let attach: Box<dyn FnMut(Request<()>) -> Result<Request<()>, Status> + Send> =
        Box::new(move |mut request: Request<()>| {
            request
                .metadata_mut()
                .insert("authorization", bearer.clone());
            Ok(request)
        });

    Ok(DeviceServiceClient::with_interceptor(channel, attach))
}

async fn create_samples(
    client: &mut AuthedClient,
    count: usize,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let device = sample::new_device();
        let response = client
            .create_device(CreateDeviceRequest {
                device: Some(device),
            })
            .await?;
        let id = response.into_inner().id;
        println!("Created device {id}");
        ids.push(id);
    }
    Ok(ids)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut auth = AuthServiceClient::connect(cli.server.clone()).await?;
    let token = auth
        .login(LoginRequest {
            username: cli.username.clone(),
            password: cli.password.clone(),
        })
        .await?
        .into_inner()
        .access_token;

    let mut client = connect(&cli.server, &token).await?;

    match cli.command {
        Commands::Login => {
            println!("Logged in as '{}'", cli.username);
            println!("{token}");
        }

        Commands::Create { count } => {
            create_samples(&mut client, count).await?;
        }

        Commands::Search {
            max_price,
            min_cores,
            min_ghz,
            min_ram_gb,
        } => {
            let filter = Filter {
                max_price_usd: max_price,
                min_cpu_cores: min_cores,
                min_cpu_ghz: min_ghz,
                min_ram: Some(Memory {
                    value: min_ram_gb,
                    unit: Unit::Gigabyte as i32,
                }),
            };

            let mut stream = client
                .search_device(SearchDeviceRequest {
                    filter: Some(filter),
                })
                .await?
                .into_inner();

            let mut found = 0;
            while let Some(response) = stream.message().await? {
                if let Some(device) = response.device {
                    found += 1;
                    println!(
                        "{} {} {} - ${:.2}",
                        device.id, device.brand, device.name, device.price_usd
                    );
                }
            }
            println!("Found {found} device(s)");
        }

        Commands::Upload { image } => {
            let ids = create_samples(&mut client, 1).await?;
            let device_id = ids.into_iter().next().unwrap_or_default();

            let data = tokio::fs::read(&image).await?;
            let image_type = image
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();

            let mut messages = vec![UploadImageRequest {
                data: Some(Data::Info(ImageInfo {
                    device_id,
                    image_type,
                })),
            }];
            messages.extend(data.chunks(CHUNK_SIZE).map(|chunk| UploadImageRequest {
                data: Some(Data::ChunkData(chunk.to_vec())),
            }));

            let response = client
                .upload_image(tokio_stream::iter(messages))
                .await?
                .into_inner();
            println!("Uploaded image {} ({} bytes)", response.id, response.size);
        }

        Commands::Rate { count } => {
            let ids = create_samples(&mut client, count).await?;
            let requests: Vec<_> = ids
                .into_iter()
                .map(|device_id| RateDeviceRequest {
                    device_id,
                    score: sample::random_score(),
                })
                .collect();

            let mut stream = client
                .rate_device(tokio_stream::iter(requests))
                .await?
                .into_inner();

            while let Some(response) = stream.message().await? {
                println!(
                    "Device {} rated {} time(s), average {:.2}",
                    response.device_id, response.rated_count, response.average_score
                );
            }
        }
    }

    Ok(())
}
