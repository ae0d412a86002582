use std::path::PathBuf;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// gRPC endpoint of the Triton inference server
    #[arg(long, env = "TRITON_URL", default_value = "http://localhost:8001")]
    pub triton_url: String,

    /// Google Drive folder receiving the uploaded originals
    #[arg(long, env = "DRIVE_FOLDER_ID", default_value = "1v8Xss5sKEEgyPHfEBtXYBTHtUevdrhjd")]
    pub drive_folder_id: String,

    /// Service account JSON used for Google Drive
    #[arg(long, env = "GOOGLE_DRIVE_CREDENTIALS", hide_env_values = true)]
    pub drive_credentials: String,

    /// Optional JSON file with pipeline settings
    #[arg(long, env = "FACE_OVERLAY_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// bind_address returns the host and port to listen on, the host may be a name such as `localhost`.
    pub fn bind_address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from([
            "face-overlay-svc",
            "--drive-credentials",
            "{}",
            "--port",
            "8080",
        ]).unwrap();
        assert_eq!(args.bind_address(), ("0.0.0.0", 8080));
        assert_eq!(args.drive_folder_id, "1v8Xss5sKEEgyPHfEBtXYBTHtUevdrhjd");
        assert!(args.config.is_none());
    }

    #[tokio::test]
    async fn test_bind_host_name() {
        let args = Args::try_parse_from([
            "face-overlay-svc",
            "--drive-credentials",
            "{}",
            "--host",
            "localhost",
            "--port",
            "0",
        ]).unwrap();
        let listener = tokio::net::TcpListener::bind(args.bind_address()).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
