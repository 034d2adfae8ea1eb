//! Generate command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use namedex_index::{BuildOptions, JsonBrowserConfig, NameIndexBuilder};

use crate::utils::{format_size, parse_size};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Browser data directory holding seq/refSeqs.json, trackList.json and the tracks
    #[arg(long, default_value = "data")]
    pub out: PathBuf,

    /// Maximum number of completions stored per prefix (0 disables completions)
    #[arg(long, default_value_t = 20)]
    pub completion_limit: usize,

    /// Maximum number of locations stored per name
    #[arg(long, default_value_t = 100)]
    pub location_limit: usize,

    /// Total memory budget of the bucket caches, split between the temporary and final stores, e.g. 64M or 1G
    #[arg(long, default_value = "256M", value_parser = parse_size)]
    pub mem: usize,

    /// Directory for temporary files (defaults to the system temporary directory)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Number of hash bits selecting a bucket, instead of estimating it
    #[arg(long, value_parser = clap::value_parser!(u8).range(4..=32))]
    pub hash_bits: Option<u8>,

    /// Merge into the existing index instead of rebuilding it
    #[arg(long)]
    pub incremental: bool,

    /// Gzip the bucket files
    #[arg(long)]
    pub compress: bool,

    /// Only index these tracks (comma-separated labels; may be repeated)
    #[arg(long, value_delimiter = ',')]
    pub tracks: Vec<String>,
}

impl GenerateArgs {
    pub fn to_options(&self) -> BuildOptions {
        BuildOptions {
            out_dir: self.out.clone(),
            completion_limit: self.completion_limit,
            location_limit: self.location_limit,
            cache_bytes: self.mem,
            work_dir: self.work_dir.clone(),
            bucket_bits: self.hash_bits,
            incremental: self.incremental,
            compress: self.compress,
            track_filter: (!self.tracks.is_empty()).then(|| self.tracks.clone()),
        }
    }
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let options = args.to_options();
    log::debug!("build options: {options:?}");
    let config = JsonBrowserConfig::new(&args.out);
    let summary = NameIndexBuilder::new(config, options)
        .build()
        .with_context(|| format!("Failed to build the name index in {}", args.out.display()))?;

    println!("Files read:     {}", summary.files_read);
    println!("Records:        {}", summary.records);
    println!("Operations:     {}", summary.operations);
    println!("Keys written:   {}", summary.keys);
    println!("Keys in index:  {}", summary.total_keys);
    println!("Bucket bits:    {}", summary.bucket_bits);
    println!(
        "Input size:     ~{} per record",
        format_size(summary.estimate.avg_record_bytes as u64)
    );
    println!("Tracks:         {}", summary.track_names.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: GenerateArgs,
    }

    #[test]
    fn test_argument_mapping() {
        let cli = TestCli::try_parse_from([
            "generate",
            "--out",
            "/tmp/browser",
            "--completion-limit",
            "5",
            "--mem",
            "64M",
            "--hash-bits",
            "16",
            "--incremental",
            "--tracks",
            "genes,snps",
            "--tracks",
            "repeats",
        ])
        .unwrap();
        let options = cli.args.to_options();
        assert_eq!(options.out_dir, PathBuf::from("/tmp/browser"));
        assert_eq!(options.completion_limit, 5);
        assert_eq!(options.location_limit, 100);
        assert_eq!(options.cache_bytes, 64 * 1024 * 1024);
        assert_eq!(options.bucket_bits, Some(16));
        assert!(options.incremental);
        assert!(!options.compress);
        assert_eq!(
            options.track_filter,
            Some(vec![
                "genes".to_string(),
                "snps".to_string(),
                "repeats".to_string()
            ])
        );

        let defaults = TestCli::try_parse_from(["generate"]).unwrap().args.to_options();
        assert_eq!(defaults.cache_bytes, 256 * 1024 * 1024);
        assert_eq!(defaults.track_filter, None);

        assert!(TestCli::try_parse_from(["generate", "--hash-bits", "2"]).is_err());
    }

    #[test]
    fn test_generate_run() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("seq")).unwrap();
        fs::write(
            dir.path().join("seq/refSeqs.json"),
            r#"[{"name":"ctgA","start":0,"end":5000}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("trackList.json"),
            r#"{"tracks":[{"label":"genes"}]}"#,
        )
        .unwrap();

        let out = dir.path().to_string_lossy().to_string();
        let cli = TestCli::try_parse_from(["generate", "--out", out.as_str()]).unwrap();
        run(cli.args).unwrap();
        assert!(dir.path().join("names/meta.json").is_file());
    }
}
