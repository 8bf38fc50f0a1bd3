use argh::FromArgs;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::{path::PathBuf, time::Duration};

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROMPT: &str = "Subtle forward motion toward camera; gentle handheld; slight parallax; preserve subject; vertical 9:16.";

#[derive(FromArgs)]
/// Client for starting, polling and downloading video generation jobs
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "start", "status", "download" or "generate"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Start(StartCommand),
    Status(StatusCommand),
    Download(DownloadCommand),
    Generate(GenerateCommand),
}

#[derive(FromArgs)]
/// Start a generation job from an image and a prompt
#[argh(subcommand, name = "start")]
struct StartCommand {
    /// the path to the image
    #[argh(option, short = 'i', default = "PathBuf::from(\"input.png\")")]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p', default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// the aspect ratio, e.g. 9:16
    #[argh(option, short = 'a')]
    aspect_ratio: Option<String>,
}

#[derive(FromArgs)]
/// Check the status of a job
#[argh(subcommand, name = "status")]
struct StatusCommand {
    /// the operation name returned by start
    #[argh(option, short = 'n')]
    name: String,
}

#[derive(FromArgs)]
/// Download the video of a finished job
#[argh(subcommand, name = "download")]
struct DownloadCommand {
    /// the operation name returned by start
    #[argh(option, short = 'n')]
    name: String,

    /// where to write the video
    #[argh(option, short = 'o', default = "PathBuf::from(\"output.mp4\")")]
    output: PathBuf,
}

#[derive(FromArgs)]
/// Start a job, wait for it and download the result
#[argh(subcommand, name = "generate")]
struct GenerateCommand {
    /// the path to the image
    #[argh(option, short = 'i', default = "PathBuf::from(\"input.png\")")]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p', default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// where to write the video
    #[argh(option, short = 'o', default = "PathBuf::from(\"output.mp4\")")]
    output: PathBuf,

    /// seconds between status polls
    #[argh(option, default = "10")]
    interval: u64,
}

fn start_request(
    image_path: &PathBuf,
    prompt: String,
    aspect_ratio: Option<String>,
) -> Result<messages::StartRequest, Box<dyn std::error::Error>> {
    if !image_path.is_file() {
        return Err(format!("Image file not found: {}", image_path.display()).into());
    }
    let is_png = image_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    let image_mime = if is_png { "image/png" } else { "image/jpeg" };

    Ok(messages::StartRequest {
        prompt,
        aspect_ratio,
        negative_prompt: None,
        image_base64: STANDARD.encode(std::fs::read(image_path)?),
        image_mime: image_mime.to_string(),
    })
}

async fn start(
    client: &reqwest::Client,
    addr: &str,
    request: &messages::StartRequest,
) -> Result<String, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("http://{}/start", addr))
        .json(request)
        .send()
        .await?;
    if !response.status().is_success() {
        let error = response.json::<serde_json::Value>().await?;
        return Err(format!("start failed: {}", error["error"]).into());
    }
    Ok(response.json::<messages::StartResponse>().await?.name)
}

async fn download(
    client: &reqwest::Client,
    addr: &str,
    name: &str,
    output: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get(format!("http://{}/download", addr))
        .query(&[("name", name)])
        .send()
        .await?;
    if response.status() != reqwest::StatusCode::OK {
        let status = response.status();
        let error = response.json::<serde_json::Value>().await?;
        return Err(format!("download failed ({}): {}", status, error).into());
    }
    let bytes = response.bytes().await?;
    tokio::fs::write(output, &bytes).await?;
    println!("Saved {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Start(command) => {
            let request = start_request(&command.image_path, command.prompt, command.aspect_ratio)?;
            let name = start(&client, &addr, &request).await?;
            println!("Operation: {}", name);
        }
        ClientCommands::Status(command) => {
            let response = client
                .get(format!("http://{}/status", addr))
                .query(&[("name", command.name.as_str())])
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
        ClientCommands::Download(command) => {
            download(&client, &addr, &command.name, &command.output).await?;
        }
        ClientCommands::Generate(command) => {
            let request = start_request(&command.image_path, command.prompt, None)?;
            let name = start(&client, &addr, &request).await?;
            println!("Operation: {}", name);

            loop {
                tokio::time::sleep(Duration::from_secs(command.interval)).await;
                let status = client
                    .get(format!("http://{}/status", addr))
                    .query(&[("name", name.as_str())])
                    .send()
                    .await?
                    .json::<messages::StatusResponse>()
                    .await?;
                if !status.done {
                    println!("Waiting for video generation...");
                    continue;
                }
                if status.has_video != Some(true) {
                    let reason = status.reason.unwrap_or_else(|| "unknown".to_string());
                    return Err(format!("No video returned: {}", reason).into());
                }
                break;
            }

            download(&client, &addr, &name, &command.output).await?;
        }
    }

    Ok(())
}
