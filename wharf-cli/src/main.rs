use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use wharf::progress::Consumer;
use wharf::pwr::CompressionAlgorithm;
use wharf::{ApplyContext, DiffContext, Error, FsPool, Pool, RediffContext};

#[macro_export]
macro_rules! eprintln_exit {
  ($($arg:tt)*) => {{
    eprintln!($($arg)*);
    return ExitCode::FAILURE;
  }};
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  /// Only print warnings and errors
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Commands,
}

// Copy of wharf::pwr::CompressionAlgorithm that derives clap::ValueEnum
#[derive(ValueEnum, Clone, Copy)]
enum Compression {
  None,
  Brotli,
  Gzip,
  Zstd,
}

impl From<Compression> for CompressionAlgorithm {
  fn from(value: Compression) -> Self {
    match value {
      Compression::None => CompressionAlgorithm::None,
      Compression::Brotli => CompressionAlgorithm::Brotli,
      Compression::Gzip => CompressionAlgorithm::Gzip,
      Compression::Zstd => CompressionAlgorithm::Zstd,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Compute a signature of a directory tree
  Sign {
    /// The directory tree to build a signature of
    dir: PathBuf,
    /// The path where the signature file will be written
    signature: PathBuf,
    /// Compression applied to the signature file
    #[arg(long, value_enum, default_value = "brotli")]
    compression: Compression,
    /// Compression quality, algorithm-dependent
    #[arg(long, default_value_t = 1)]
    quality: i32,
  },
  /// Compute a patch between the tree a signature describes and a new tree
  Diff {
    /// The old directory tree the signature was built from
    old_dir: PathBuf,
    /// The signature of `old_dir`
    signature: PathBuf,
    /// The new directory tree to diff against the signature
    new_dir: PathBuf,
    /// The path where the patch file will be written
    patch: PathBuf,
    /// Compression applied to the patch file
    #[arg(long, value_enum, default_value = "brotli")]
    compression: Compression,
    /// Compression quality, algorithm-dependent
    #[arg(long, default_value_t = 1)]
    quality: i32,
  },
  /// Apply a patch onto an old directory tree, producing a new one
  Apply {
    /// The patch file to apply
    patch: PathBuf,
    /// The old directory tree referenced by the patch
    old_dir: PathBuf,
    /// The directory where the resulting tree will be written
    new_dir: PathBuf,
  },
  /// Verify that a directory tree matches a signature
  Validate {
    /// The directory tree to check
    dir: PathBuf,
    /// The signature to check `dir` against
    signature: PathBuf,
  },
  /// Tighten an existing patch into a smaller bsdiff-style patch
  Rediff {
    /// The patch file to optimize
    patch: PathBuf,
    /// The old directory tree the patch was computed from
    old_dir: PathBuf,
    /// The new directory tree the patch was computed against
    new_dir: PathBuf,
    /// The path where the optimized patch file will be written
    output: PathBuf,
    /// Number of worker threads; 0 runs rediff sequentially on the calling thread
    #[arg(long, default_value_t = 0)]
    workers: usize,
    /// Files larger than this (in bytes) are left untouched instead of rediffed
    #[arg(long, default_value_t = wharf::patch::rediff::DEFAULT_MAX_TARGET_FILE_SIZE)]
    max_target_file_size: u64,
    /// Compression applied to the output patch file
    #[arg(long, value_enum, default_value = "brotli")]
    compression: Compression,
    /// Compression quality, algorithm-dependent
    #[arg(long, default_value_t = 1)]
    quality: i32,
  },
}

fn init_tracing(quiet: bool) {
  let level = if quiet {
    tracing::Level::WARN
  } else {
    tracing::Level::INFO
  };

  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .init();
}

fn progress_bar(quiet: bool, total: u64) -> indicatif::ProgressBar {
  let bar = if quiet {
    indicatif::ProgressBar::hidden()
  } else {
    indicatif::ProgressBar::new(total)
  };
  bar.set_style(
    indicatif::ProgressStyle::default_bar()
      .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) ({eta}) {msg}")
      .expect("invalid indicatif template")
      .progress_chars("#>-"),
  );
  bar
}

/// A [`Consumer`] backed by an [`indicatif::ProgressBar`]: progress fractions
/// are scaled back up to a byte position against the bar's known length, file
/// labels become the bar's trailing message, and log messages are forwarded
/// to `tracing` the same way [`wharf::progress::TracingConsumer`] does.
struct BarConsumer<'a> {
  bar: &'a indicatif::ProgressBar,
}

impl Consumer for BarConsumer<'_> {
  fn progress(&mut self, fraction: f64) {
    let position = (fraction * self.bar.length().unwrap_or(0) as f64).round() as u64;
    self.bar.set_position(position);
  }

  fn progress_label(&mut self, label: &str) {
    self.bar.set_message(label.to_string());
  }

  fn info(&mut self, message: &str) {
    tracing::info!("{message}");
  }

  fn debug(&mut self, message: &str) {
    tracing::debug!("{message}");
  }

  fn warn(&mut self, message: &str) {
    tracing::warn!("{message}");
  }
}

fn open_pool(dir: &std::path::Path) -> Result<FsPool, Error> {
  FsPool::walk(dir)
}

fn sign(dir: PathBuf, signature: PathBuf, compression: Compression, quality: i32) -> ExitCode {
  let pool = match open_pool(&dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", dir.display()),
  };

  let total = pool.container().file_bytes();
  let bar = progress_bar(false, total);

  let codecs = wharf::codec::Registry::default();
  let settings = wharf::pwr::CompressionSettings {
    algorithm: CompressionAlgorithm::from(compression) as i32,
    quality,
  };

  let file = match std::fs::File::create(&signature) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't create \"{}\": {e}", signature.display()),
  };
  let mut writer = BufWriter::new(file);

  let mut consumer = BarConsumer { bar: &bar };
  let result = wharf::signature::write::write_signature(&mut writer, &pool, settings, &codecs, &mut consumer);
  bar.finish_and_clear();

  if let Err(e) = result {
    eprintln_exit!("Couldn't write signature: {e}");
  }

  println!("Signature written to \"{}\"", signature.display());
  ExitCode::SUCCESS
}

fn diff(
  old_dir: PathBuf,
  signature: PathBuf,
  new_dir: PathBuf,
  patch: PathBuf,
  compression: Compression,
  quality: i32,
) -> ExitCode {
  let old_pool = match open_pool(&old_dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", old_dir.display()),
  };
  let new_pool = match open_pool(&new_dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", new_dir.display()),
  };

  let codecs = wharf::codec::Registry::default();

  let old_index = match load_signature_index(&signature, &codecs) {
    Ok(index) => index,
    Err(e) => eprintln_exit!("Couldn't read signature \"{}\": {e}", signature.display()),
  };

  let total = new_pool.container().file_bytes();
  let bar = progress_bar(false, total);

  let settings = wharf::pwr::CompressionSettings {
    algorithm: CompressionAlgorithm::from(compression) as i32,
    quality,
  };
  let context = DiffContext::new(settings);

  let file = match std::fs::File::create(&patch) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't create \"{}\": {e}", patch.display()),
  };
  let mut writer = BufWriter::new(file);

  let mut consumer = BarConsumer { bar: &bar };
  let result = context.diff(&mut writer, &old_pool, &new_pool, &old_index, &codecs, &mut consumer);
  bar.finish_and_clear();

  if let Err(e) = result {
    eprintln_exit!("Couldn't write patch: {e}");
  }

  println!("Patch written to \"{}\"", patch.display());
  ExitCode::SUCCESS
}

fn load_signature_index(
  path: &std::path::Path,
  codecs: &wharf::codec::Registry,
) -> Result<wharf::signature::index::SignatureIndex, Error> {
  let file = std::fs::File::open(path)?;
  let mut reader = std::io::BufReader::new(file);
  let mut signature = wharf::Signature::read(&mut reader, codecs)?;

  let hashes: Vec<_> = signature.block_hash_iter.by_ref().collect::<Result<_, _>>()?;

  Ok(wharf::signature::index::SignatureIndex::build(
    &signature.container_new,
    &hashes,
  ))
}

fn apply(patch: PathBuf, old_dir: PathBuf, new_dir: PathBuf) -> ExitCode {
  let old_pool = match open_pool(&old_dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", old_dir.display()),
  };

  let codecs = wharf::codec::Registry::default();

  let file = match std::fs::File::open(&patch) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't open \"{}\": {e}", patch.display()),
  };
  let mut reader = std::io::BufReader::new(file);

  let mut parsed = match wharf::Patch::read(&mut reader, &codecs) {
    Ok(p) => p,
    Err(e) => eprintln_exit!("Couldn't read patch: {e}"),
  };

  let total = parsed.container_new.file_bytes();
  let bar = progress_bar(false, total);

  let context = ApplyContext::new();
  let mut consumer = BarConsumer { bar: &bar };
  let result = context.apply(&mut parsed, &old_pool, &new_dir, None, &mut consumer);
  bar.finish_and_clear();

  if let Err(e) = result {
    eprintln_exit!("Couldn't apply patch: {e}");
  }

  println!("Applied patch to \"{}\"", new_dir.display());
  ExitCode::SUCCESS
}

fn validate(dir: PathBuf, signature: PathBuf) -> ExitCode {
  let pool = match open_pool(&dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", dir.display()),
  };

  let codecs = wharf::codec::Registry::default();

  let file = match std::fs::File::open(&signature) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't open \"{}\": {e}", signature.display()),
  };
  let mut reader = std::io::BufReader::new(file);

  let mut parsed = match wharf::Signature::read(&mut reader, &codecs) {
    Ok(s) => s,
    Err(e) => eprintln_exit!("Couldn't read signature: {e}"),
  };

  let total = parsed.container_new.file_bytes();
  let bar = progress_bar(false, total);

  let mut consumer = BarConsumer { bar: &bar };
  let issues = match parsed.verify_files(&pool, &mut consumer) {
    Ok(issues) => issues,
    Err(e) => eprintln_exit!("Couldn't verify files: {e}"),
  };
  bar.finish_and_clear();

  if issues.are_files_intact() {
    println!("All files are intact.");
    ExitCode::SUCCESS
  } else {
    eprintln!(
      "{} file(s) are missing or corrupted ({} bytes to fix):",
      issues.files.len(),
      issues.bytes_to_fix(&parsed.container_new)
    );
    for &index in &issues.files {
      eprintln!("  {}", parsed.container_new.files[index].path);
    }
    ExitCode::FAILURE
  }
}

#[allow(clippy::too_many_arguments)]
fn rediff(
  patch: PathBuf,
  old_dir: PathBuf,
  new_dir: PathBuf,
  output: PathBuf,
  workers: usize,
  max_target_file_size: u64,
  compression: Compression,
  quality: i32,
) -> ExitCode {
  let old_pool = match open_pool(&old_dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", old_dir.display()),
  };
  let new_pool = match open_pool(&new_dir) {
    Ok(pool) => pool,
    Err(e) => eprintln_exit!("Couldn't walk \"{}\": {e}", new_dir.display()),
  };

  let codecs = wharf::codec::Registry::default();

  let file = match std::fs::File::open(&patch) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't open \"{}\": {e}", patch.display()),
  };
  let mut reader = std::io::BufReader::new(file);

  let mut parsed = match wharf::Patch::read(&mut reader, &codecs) {
    Ok(p) => p,
    Err(e) => eprintln_exit!("Couldn't read patch: {e}"),
  };

  let total = parsed.container_new.file_bytes();
  let bar = progress_bar(false, total);

  let settings = wharf::pwr::CompressionSettings {
    algorithm: CompressionAlgorithm::from(compression) as i32,
    quality,
  };
  let context = RediffContext::new(settings)
    .with_workers(workers)
    .with_max_target_file_size(max_target_file_size);

  let out_file = match std::fs::File::create(&output) {
    Ok(f) => f,
    Err(e) => eprintln_exit!("Couldn't create \"{}\": {e}", output.display()),
  };
  let mut writer = BufWriter::new(out_file);

  let mut consumer = BarConsumer { bar: &bar };
  let result = context.rediff(&mut parsed, &old_pool, &new_pool, &mut writer, &codecs, &mut consumer);
  bar.finish_and_clear();

  if let Err(e) = result {
    eprintln_exit!("Couldn't rediff patch: {e}");
  }

  println!("Optimized patch written to \"{}\"", output.display());
  ExitCode::SUCCESS
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.quiet);

  match cli.command {
    Commands::Sign {
      dir,
      signature,
      compression,
      quality,
    } => sign(dir, signature, compression, quality),
    Commands::Diff {
      old_dir,
      signature,
      new_dir,
      patch,
      compression,
      quality,
    } => diff(old_dir, signature, new_dir, patch, compression, quality),
    Commands::Apply {
      patch,
      old_dir,
      new_dir,
    } => apply(patch, old_dir, new_dir),
    Commands::Validate { dir, signature } => validate(dir, signature),
    Commands::Rediff {
      patch,
      old_dir,
      new_dir,
      output,
      workers,
      max_target_file_size,
      compression,
      quality,
    } => rediff(
      patch,
      old_dir,
      new_dir,
      output,
      workers,
      max_target_file_size,
      compression,
      quality,
    ),
  }
}
