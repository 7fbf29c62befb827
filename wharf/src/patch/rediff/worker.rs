//! Parallel scheduling of the per-file optimization pass, and re-framing the
//! result into a new patch stream.

use super::analysis::{self, FileOps, FileTouch};
use super::optimize::build_controls;
use crate::cancel::CancellationToken;
use crate::codec::Registry;
use crate::common::MAGIC_PATCH;
use crate::error::{Error, Result};
use crate::patch::diff::write_hey_you_did_it;
use crate::patch::Patch;
use crate::pool::Pool;
use crate::progress::{ByteProgress, Consumer};
use crate::protos::{bsdiff, encode_protobuf, pwr};

use std::io::Write;

/// One new file's rediff job: either left as-is (pass-through) or optimized
/// against a target file read in full from `old_pool`.
enum Job {
  PassThrough(FileOps),
  Optimize { new_index: usize, target_index: usize },
}

/// Re-optimize `patch` (already parsed against `old_pool`/`new_pool`) using up
/// to `workers` threads, writing the result to `writer`.
///
/// `workers == 0` runs the optimization pass sequentially on the calling
/// thread. Either way, results are assembled in new-file order, so the output
/// is byte-identical regardless of worker count.
#[allow(clippy::too_many_arguments)]
pub fn rediff(
  patch: &mut Patch<'_>,
  old_pool: &dyn Pool,
  new_pool: &dyn Pool,
  writer: &mut impl Write,
  compression: pwr::CompressionSettings,
  codecs: &Registry,
  workers: usize,
  max_target_file_size: u64,
  cancel: &CancellationToken,
  consumer: &mut dyn Consumer,
) -> Result<()> {
  let mut progress = ByteProgress::new(consumer, new_pool.container().size as u64);
  let mut progress_callback = |n: u64| progress.add(n);

  let all_ops = analysis::read_patch_ops(patch)?;
  let touch = analysis::analyze(&patch.container_old, &patch.container_new, &all_ops);

  let jobs: Vec<Job> = all_ops
    .into_iter()
    .zip(touch)
    .enumerate()
    .map(|(new_index, (ops, touch))| match touch {
      FileTouch::Untouched | FileTouch::TouchedNoTarget => Job::PassThrough(ops),
      FileTouch::Touched { target_index } => {
        let target_size = old_pool
          .container()
          .get_file(target_index)
          .map(|f| f.size as u64)
          .unwrap_or(u64::MAX);

        // Files too large to fit a suffix array within the configured memory
        // budget are left untouched rather than rediffed.
        if target_size > max_target_file_size {
          Job::PassThrough(ops)
        } else {
          Job::Optimize {
            new_index,
            target_index,
          }
        }
      }
    })
    .collect();

  let results = run_jobs(&jobs, old_pool, new_pool, workers, cancel, &mut progress_callback)?;

  write_output(writer, patch, &results, compression, codecs)
}

enum JobResult {
  PassThrough(FileOps),
  Optimized {
    target_index: usize,
    controls: Vec<bsdiff::Control>,
  },
}

fn run_jobs(
  jobs: &[Job],
  old_pool: &dyn Pool,
  new_pool: &dyn Pool,
  workers: usize,
  cancel: &CancellationToken,
  progress_callback: &mut impl FnMut(u64),
) -> Result<Vec<JobResult>> {
  if workers == 0 {
    return jobs
      .iter()
      .map(|job| run_one_job(job, old_pool, new_pool, cancel, progress_callback))
      .collect();
  }

  let pool = rayon::ThreadPoolBuilder::new()
    .num_threads(workers)
    .build()
    .map_err(|e| Error::unsupported(format!("couldn't start rediff worker pool: {e}")))?;

  // `par_iter().map().collect()` preserves input order in the output `Vec`,
  // so the assembled patch matches the sequential (workers == 0) byte layout
  // regardless of how many threads actually ran.
  let results = pool.install(|| {
    use rayon::prelude::*;
    jobs
      .par_iter()
      .map(|job| run_one_job(job, old_pool, new_pool, cancel, &mut |_| {}))
      .collect::<Result<Vec<_>>>()
  })?;

  if cancel.is_cancelled() {
    return Err(Error::Cancelled);
  }

  Ok(results)
}

fn run_one_job(
  job: &Job,
  old_pool: &dyn Pool,
  new_pool: &dyn Pool,
  cancel: &CancellationToken,
  progress_callback: &mut impl FnMut(u64),
) -> Result<JobResult> {
  if cancel.is_cancelled() {
    return Err(Error::Cancelled);
  }

  match job {
    Job::PassThrough(ops) => Ok(JobResult::PassThrough(ops.clone())),
    Job::Optimize {
      new_index,
      target_index,
    } => {
      let target = read_whole_file(new_pool, *new_index)?;
      let source = read_whole_file(old_pool, *target_index)?;
      progress_callback(target.len() as u64);

      let controls = build_controls(&target, &source);

      // If the optimized control stream somehow ends up larger than the
      // file it represents, prefer literal bytes: rediff must never make a
      // patch worse than a trivial copy would.
      let optimized_len: usize = controls.iter().map(|c| c.add.len() + c.copy.len() + 9).sum();
      if optimized_len >= target.len() {
        return Ok(JobResult::PassThrough(FileOps::Rsync(vec![pwr::SyncOp {
          r#type: pwr::sync_op::Type::Data as i32,
          file_index: *new_index as i64,
          block_index: 0,
          block_span: 0,
          data: target,
        }])));
      }

      Ok(JobResult::Optimized {
        target_index: *target_index,
        controls,
      })
    }
  }
}

fn read_whole_file(pool: &dyn Pool, file_index: usize) -> Result<Vec<u8>> {
  use std::io::Read;
  let mut reader = pool.open(file_index)?;
  let mut buf = Vec::new();
  reader.read_to_end(&mut buf)?;
  Ok(buf)
}

fn write_output(
  writer: &mut impl Write,
  patch: &Patch<'_>,
  results: &[JobResult],
  compression: pwr::CompressionSettings,
  codecs: &Registry,
) -> Result<()> {
  writer.write_all(&MAGIC_PATCH.to_le_bytes())?;

  let algorithm = compression.algorithm();
  let quality = compression.quality;

  let header = pwr::PatchHeader {
    compression: Some(compression),
  };
  encode_protobuf(&header, writer)?;

  let mut out = codecs.wrap_writer(algorithm, Box::new(&mut *writer), quality)?;

  encode_protobuf(&patch.container_old, &mut out)?;
  encode_protobuf(&patch.container_new, &mut out)?;

  for (new_index, result) in results.iter().enumerate() {
    match result {
      JobResult::PassThrough(ops) => {
        let sync_header = pwr::SyncHeader {
          r#type: pwr::sync_header::Type::Rsync as i32,
          file_index: new_index as i64,
        };
        encode_protobuf(&sync_header, &mut out)?;

        let FileOps::Rsync(sync_ops) = ops else {
          return Err(Error::corrupt(
            "pass-through job unexpectedly carried bsdiff ops",
          ));
        };
        for op in sync_ops {
          encode_protobuf(op, &mut out)?;
        }
        write_hey_you_did_it(&mut out)?;
      }
      JobResult::Optimized {
        target_index,
        controls,
      } => {
        let sync_header = pwr::SyncHeader {
          r#type: pwr::sync_header::Type::Bsdiff as i32,
          file_index: new_index as i64,
        };
        encode_protobuf(&sync_header, &mut out)?;

        let bsdiff_header = pwr::BsdiffHeader {
          target_index: *target_index as i64,
        };
        encode_protobuf(&bsdiff_header, &mut out)?;

        for control in controls {
          encode_protobuf(control, &mut out)?;
        }
        write_hey_you_did_it(&mut out)?;
      }
    }
  }

  out.flush()?;
  Ok(())
}
