use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "photosync")]
#[command(about = "Back up photos to your own server, end-to-end encrypted")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the record database and keys
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Server base URL (overrides the profile and PHOTOSYNC_SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save the server URL, create the device key and fetch the server key
    Init,
    /// Show the device public key and the trusted server key
    Keys,
    /// Create an account on the server
    Register {
        username: String,
        /// Password (falls back to PHOTOSYNC_PASSWORD, then stdin)
        #[arg(long)]
        password: Option<String>,
    },
    /// Confirm a registration with the issued code
    Verify { username: String, code: String },
    /// Log in and store the auth token in the system keychain
    Login {
        username: String,
        /// Password (falls back to PHOTOSYNC_PASSWORD, then stdin)
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored auth token
    Logout,
    /// Record photos found under a directory
    Scan {
        /// Photo directory
        dir: PathBuf,
        /// Ignore the sync cursor and read everything
        #[arg(long)]
        full: bool,
    },
    /// Record the images already stored on the server
    Pull,
    /// Queue files for upload
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Upload queued and failed records once
    Upload {
        /// Output the cycle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show record counts and session state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records, newest first
    List {
        /// Only records in this state (local, pending, uploading, uploaded, failed)
        #[arg(long)]
        status: Option<String>,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a local or failed record again
    Retry {
        /// Record id
        id: String,
    },
    /// Queue newly scanned photos automatically
    AutoUpload {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Reconcile and upload periodically until Ctrl-C
    Watch {
        /// Photo directory to scan on every pass
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}
