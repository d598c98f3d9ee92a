use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "uploadguard",
    about = "Uploadguard - Screen uploaded files for hidden content, corruption and archive bombs",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// JSON file overriding thresholds and denylists
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Record rejected files in this SQLite database
    #[arg(long, global = true)]
    pub audit_db: Option<PathBuf>,

    /// Skip LSB analysis (no pixel decoding)
    #[arg(long, global = true)]
    pub no_lsb: bool,

    /// Number of parallel scanning threads (0 = auto-detect)
    #[arg(short, long, global = true, default_value = "0")]
    pub threads: usize,

    /// Enable verbose logging of all operations
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars and only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the full upload decision on files or directories
    Scan {
        /// Files or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Declared MIME type (guessed from the file name when absent)
        #[arg(long)]
        mime: Option<String>,

        /// Room recorded with blocked uploads
        #[arg(long)]
        room: Option<String>,

        /// Maximum directory traversal depth
        #[arg(long, default_value = "10")]
        max_depth: usize,

        /// Follow symbolic links during traversal
        #[arg(long)]
        follow_symlinks: bool,

        /// Delete files that are rejected, as an upload handler would
        #[arg(long)]
        delete_rejected: bool,
    },

    /// Print the full verdict for one file
    Diagnose {
        file: PathBuf,
    },

    /// Check a .zip or .rar archive for decompression bombs
    Bomb {
        archive: PathBuf,
    },

    /// Run only the extension/MIME pre-filter
    Quick {
        /// Declared MIME type
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,

        /// File name as given by the client
        filename: String,
    },
}

impl Args {
    /// Log level selected by -v / -q.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan_with_globals() {
        let args = Args::try_parse_from([
            "uploadguard",
            "scan",
            "a.png",
            "uploads/",
            "--mime",
            "image/png",
            "--json",
            "-v",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.log_level(), "debug");
        match args.command {
            Command::Scan { paths, mime, max_depth, .. } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(mime.as_deref(), Some("image/png"));
                assert_eq!(max_depth, 10);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_quick() {
        let args = Args::try_parse_from(["uploadguard", "quick", "photo.jpg.exe"]).unwrap();
        assert_eq!(
            args.command,
            Command::Quick {
                mime: "application/octet-stream".into(),
                filename: "photo.jpg.exe".into(),
            }
        );
    }

    #[test]
    fn test_scan_requires_paths() {
        assert!(Args::try_parse_from(["uploadguard", "scan"]).is_err());
    }
}
