//! End-to-end coverage of sign -> diff -> apply -> rediff -> validate across
//! real directory trees on disk, exercising the same invariants unit tests
//! only check on in-memory pools.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use wharf::codec::Registry;
use wharf::patch::{ApplyContext, DiffContext, RediffContext};
use wharf::pool::FsPool;
use wharf::progress::NullConsumer;
use wharf::pwr::{CompressionAlgorithm, CompressionSettings};
use wharf::signature::index::SignatureIndex;
use wharf::signature::write::write_signature;
use wharf::{Patch, Signature};

fn no_compression() -> CompressionSettings {
  CompressionSettings {
    algorithm: CompressionAlgorithm::None as i32,
    quality: 1,
  }
}

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
  for (path, data) in files {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, data).unwrap();
  }
}

fn sign_dir(dir: &Path, codecs: &Registry) -> (FsPool, Vec<u8>) {
  let pool = FsPool::walk(dir).unwrap();
  let mut buf = Vec::new();
  write_signature(&mut buf, &pool, no_compression(), codecs, &mut NullConsumer).unwrap();
  (pool, buf)
}

fn signature_index(sig_bytes: &[u8], codecs: &Registry) -> SignatureIndex {
  let mut reader = BufReader::new(std::io::Cursor::new(sig_bytes.to_vec()));
  let mut sig = Signature::read(&mut reader, codecs).unwrap();
  let hashes: Vec<_> = sig.block_hash_iter.by_ref().collect::<wharf::Result<_>>().unwrap();
  SignatureIndex::build(&sig.container_new, &hashes)
}

fn diff_dirs(old: &Path, new: &Path, codecs: &Registry) -> Vec<u8> {
  let (old_pool, old_sig) = sign_dir(old, codecs);
  let new_pool = FsPool::walk(new).unwrap();
  let index = signature_index(&old_sig, codecs);

  let mut patch_bytes = Vec::new();
  let context = DiffContext::new(no_compression());
  context
    .diff(&mut patch_bytes, &old_pool, &new_pool, &index, codecs, &mut NullConsumer)
    .unwrap();
  patch_bytes
}

fn apply_patch(patch_bytes: &[u8], old: &Path, out: &Path, codecs: &Registry) {
  let old_pool = FsPool::walk(old).unwrap();
  let mut reader = BufReader::new(std::io::Cursor::new(patch_bytes.to_vec()));
  let mut patch = Patch::read(&mut reader, codecs).unwrap();

  let context = ApplyContext::new();
  context
    .apply(&mut patch, &old_pool, out, None, &mut NullConsumer)
    .unwrap();
}

/// Rediffs `patch_bytes` against `old`/`new` and returns the optimized bytes.
fn rediff_bytes(patch_bytes: &[u8], old: &Path, new: &Path, codecs: &Registry, workers: usize) -> Vec<u8> {
  let old_pool = FsPool::walk(old).unwrap();
  let new_pool = FsPool::walk(new).unwrap();
  let mut reader = BufReader::new(std::io::Cursor::new(patch_bytes.to_vec()));
  let mut parsed = Patch::read(&mut reader, codecs).unwrap();

  let mut out = Vec::new();
  RediffContext::new(no_compression())
    .with_workers(workers)
    .rediff(&mut parsed, &old_pool, &new_pool, &mut out, codecs, &mut NullConsumer)
    .unwrap();
  out
}

fn read_tree(root: &Path, files: &[&str]) -> Vec<Vec<u8>> {
  files.iter().map(|f| fs::read(root.join(f)).unwrap()).collect()
}

#[test]
fn apply_of_diff_reproduces_the_new_tree_byte_for_byte() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  write_tree(old_dir.path(), &[("a.bin", b"hello world"), ("sub/b.bin", b"unchanged")]);
  write_tree(new_dir.path(), &[("a.bin", b"hello there, world"), ("sub/b.bin", b"unchanged")]);

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);

  assert_eq!(
    read_tree(out_dir.path(), &["a.bin", "sub/b.bin"]),
    read_tree(new_dir.path(), &["a.bin", "sub/b.bin"])
  );
}

#[test]
fn rediff_sequential_and_parallel_agree_and_apply_to_the_same_tree() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  let old_body = vec![0x42u8; wharf::BLOCK_SIZE as usize * 3 + 17];
  let mut new_body = old_body.clone();
  new_body[100] ^= 0xFF;
  new_body.truncate(wharf::BLOCK_SIZE as usize * 3);
  new_body.extend_from_slice(b"appended tail bytes");

  write_tree(old_dir.path(), &[("big.bin", &old_body)]);
  write_tree(new_dir.path(), &[("big.bin", &new_body)]);

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);

  let seq_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 0);
  let par_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 4);

  assert_eq!(seq_out, par_out);

  let out_dir = tempfile::tempdir().unwrap();
  apply_patch(&par_out, old_dir.path(), out_dir.path(), &codecs);
  assert_eq!(fs::read(out_dir.path().join("big.bin")).unwrap(), new_body);
}

#[test]
fn identical_trees_rediff_to_a_byte_identical_untouched_patch() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  write_tree(old_dir.path(), &[("same.bin", b"nothing changes here")]);
  write_tree(new_dir.path(), &[("same.bin", b"nothing changes here")]);

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  let old_pool = FsPool::walk(old_dir.path()).unwrap();
  let new_pool = FsPool::walk(new_dir.path()).unwrap();

  let mut reader = BufReader::new(std::io::Cursor::new(patch.clone()));
  let mut parsed = Patch::read(&mut reader, &codecs).unwrap();

  let mut rediffed = Vec::new();
  RediffContext::new(no_compression())
    .rediff(&mut parsed, &old_pool, &new_pool, &mut rediffed, &codecs, &mut NullConsumer)
    .unwrap();

  assert_eq!(patch, rediffed);
}

#[test]
fn validate_catches_tampering_after_apply() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  write_tree(old_dir.path(), &[("a.bin", b"version one")]);
  write_tree(new_dir.path(), &[("a.bin", b"version two, longer")]);

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);

  let (_, new_sig_bytes) = sign_dir(new_dir.path(), &codecs);

  let out_pool = FsPool::walk(out_dir.path()).unwrap();
  let mut reader = BufReader::new(std::io::Cursor::new(new_sig_bytes.clone()));
  let mut sig = Signature::read(&mut reader, &codecs).unwrap();
  let issues = sig.verify_files(&out_pool, &mut NullConsumer).unwrap();
  assert!(issues.are_files_intact());

  // Now corrupt the output and verify again.
  fs::write(out_dir.path().join("a.bin"), b"corrupted!!!").unwrap();
  let out_pool = FsPool::walk(out_dir.path()).unwrap();
  let mut reader = BufReader::new(std::io::Cursor::new(new_sig_bytes));
  let mut sig = Signature::read(&mut reader, &codecs).unwrap();
  let issues = sig.verify_files(&out_pool, &mut NullConsumer).unwrap();
  assert!(!issues.are_files_intact());
  assert_eq!(&*issues.files, &[0]);
}

#[test]
fn cancellation_mid_rediff_yields_cancelled_error() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  write_tree(old_dir.path(), &[("a.bin", b"aaaa"), ("b.bin", b"bbbb")]);
  write_tree(new_dir.path(), &[("a.bin", b"AAAA"), ("b.bin", b"BBBB")]);

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  let old_pool = FsPool::walk(old_dir.path()).unwrap();
  let new_pool = FsPool::walk(new_dir.path()).unwrap();

  let mut reader = BufReader::new(std::io::Cursor::new(patch));
  let mut parsed = Patch::read(&mut reader, &codecs).unwrap();

  let context = RediffContext::new(no_compression());
  context.cancel.cancel();

  let mut out = Vec::new();
  let result = context.rediff(&mut parsed, &old_pool, &new_pool, &mut out, &codecs, &mut NullConsumer);
  assert!(matches!(result, Err(wharf::Error::Cancelled)));
}

#[test]
fn boundary_sizes_diff_and_apply_correctly() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  let block = wharf::BLOCK_SIZE as usize;
  let files: &[(&str, usize)] = &[
    ("empty.bin", 0),
    ("one_byte.bin", 1),
    ("exact_block.bin", block),
    ("block_plus_one.bin", block + 1),
    ("block_minus_one.bin", block - 1),
  ];

  let old_tree: Vec<(&str, Vec<u8>)> = files
    .iter()
    .map(|(name, size)| (*name, vec![0xABu8; *size]))
    .collect();
  let new_tree: Vec<(&str, Vec<u8>)> = files
    .iter()
    .map(|(name, size)| {
      let mut data = vec![0xABu8; *size];
      if !data.is_empty() {
        data[0] = 0xCD;
      }
      (*name, data)
    })
    .collect();

  for (name, data) in &old_tree {
    write_tree(old_dir.path(), &[(*name, data.as_slice())]);
  }
  for (name, data) in &new_tree {
    write_tree(new_dir.path(), &[(*name, data.as_slice())]);
  }

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);

  for (name, expected) in &new_tree {
    let actual = fs::read(out_dir.path().join(name)).unwrap();
    assert_eq!(&actual, expected, "mismatch for {name}");
  }
}

#[test]
fn zero_file_container_round_trips() {
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  fs::create_dir_all(old_dir.path().join("empty_sub")).unwrap();
  fs::create_dir_all(new_dir.path().join("empty_sub")).unwrap();

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);

  assert!(out_dir.path().join("empty_sub").is_dir());
}

// The three scenarios below mirror a set of rediff regression scenarios this
// optimizer was historically checked against: a file that grows past its old
// size (rediff isn't guaranteed to help), a file with a couple of localized
// single-byte edits (rediff should shrink the rsync patch considerably), and
// a file that's both resized and edited, where the initial rsync pass already
// does reasonably well but bsdiff-style rediffing still tightens it further.

/// Deterministic pseudo-random fill, standing in for a per-file content seed:
/// same seed and size always produce the same bytes.
fn seeded_bytes(seed: u64, size: usize) -> Vec<u8> {
  let mut state = seed.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
  let mut out = Vec::with_capacity(size);
  for _ in 0..size {
    // xorshift64
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    out.push((state >> 24) as u8);
  }
  out
}

/// Perturbs `data` at every `interval`-th byte (starting after `skip` hits),
/// XOR-ing in `delta`. Stops early after `max` modifications, if given.
fn apply_bsmod(data: &mut [u8], interval: usize, delta: u8, max: Option<usize>, skip: usize) {
  let mut hit = 0usize;
  let mut modified = 0usize;
  let mut pos = interval;
  while pos < data.len() {
    if hit >= skip {
      data[pos] ^= delta;
      modified += 1;
      if let Some(max) = max {
        if modified >= max {
          break;
        }
      }
    }
    hit += 1;
    pos += interval;
  }
}

#[test]
fn rediff_scenario_where_a_file_grows_past_its_old_size() {
  let block = wharf::BLOCK_SIZE as usize;
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  let old_subfile = seeded_bytes(0x1, block * 21 + 14);
  let new_subfile = seeded_bytes(0x1, block * 27 + 14);
  let unchanged = seeded_bytes(0x2, block * 2 + 1);

  write_tree(
    old_dir.path(),
    &[
      ("subdir/file-1", &old_subfile),
      ("file-1", &unchanged),
      ("dir2/file-2", &seeded_bytes(0x3, block + 5)),
    ],
  );
  write_tree(
    new_dir.path(),
    &[
      ("subdir/file-1", &new_subfile),
      ("file-1", &unchanged),
      ("dir2/file-2", &seeded_bytes(0x33, block + 5)),
    ],
  );

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);
  assert_eq!(fs::read(out_dir.path().join("subdir/file-1")).unwrap(), new_subfile);

  let seq_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 0);
  let par_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 4);
  assert_eq!(seq_out, par_out, "sequential and parallel rediff must agree byte-for-byte");

  let rediffed_out = tempfile::tempdir().unwrap();
  apply_patch(&seq_out, old_dir.path(), rediffed_out.path(), &codecs);
  assert_eq!(
    fs::read(rediffed_out.path().join("subdir/file-1")).unwrap(),
    new_subfile
  );
  assert_eq!(
    fs::read(rediffed_out.path().join("dir2/file-2")).unwrap(),
    fs::read(new_dir.path().join("dir2/file-2")).unwrap()
  );
}

#[test]
fn rediff_scenario_with_a_couple_of_localized_edits_shrinks_the_patch() {
  let block = wharf::BLOCK_SIZE as usize;
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  let old_subfile = seeded_bytes(0x1, block * 21 + 14);
  let mut new_subfile = old_subfile.clone();
  apply_bsmod(&mut new_subfile, block / 2 + 3, 0x4, None, 0);
  apply_bsmod(&mut new_subfile, block / 3 + 7, 0x18, None, 0);
  let unchanged = seeded_bytes(0x2, block * 2 + 1);

  write_tree(
    old_dir.path(),
    &[
      ("subdir/file-1", &old_subfile),
      ("file-1", &unchanged),
      ("dir2/file-2", &seeded_bytes(0x3, block + 5)),
    ],
  );
  write_tree(
    new_dir.path(),
    &[
      ("subdir/file-1", &new_subfile),
      ("file-1", &unchanged),
      ("dir2/file-2", &seeded_bytes(0x33, block + 5)),
    ],
  );

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);
  assert_eq!(fs::read(out_dir.path().join("subdir/file-1")).unwrap(), new_subfile);

  let seq_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 0);
  let par_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 4);
  assert_eq!(seq_out, par_out, "sequential and parallel rediff must agree byte-for-byte");

  assert!(
    seq_out.len() < patch.len(),
    "rediffing a couple of single-byte edits should shrink the patch ({} >= {})",
    seq_out.len(),
    patch.len()
  );

  let rediffed_out = tempfile::tempdir().unwrap();
  apply_patch(&seq_out, old_dir.path(), rediffed_out.path(), &codecs);
  assert_eq!(
    fs::read(rediffed_out.path().join("subdir/file-1")).unwrap(),
    new_subfile
  );
}

#[test]
fn rediff_scenario_still_shrinks_the_patch_when_rsync_already_did_reasonably_well() {
  let block = wharf::BLOCK_SIZE as usize;
  let old_dir = tempfile::tempdir().unwrap();
  let new_dir = tempfile::tempdir().unwrap();
  let out_dir = tempfile::tempdir().unwrap();
  let codecs = Registry::default();

  let old_subfile = seeded_bytes(0x1, block * 58 + 14);
  // Same seed as old_subfile, so the two streams naturally share a long
  // common prefix before the bsmods below carve out a few single-byte edits.
  let mut new_subfile = seeded_bytes(0x1, block * 61);
  apply_bsmod(&mut new_subfile, block / 2 + 3, 0x4, Some(4), 20);
  apply_bsmod(&mut new_subfile, block / 3 + 7, 0x18, Some(6), 20);

  let old_file1 = seeded_bytes(0x2, block * 16);
  let mut new_file1 = seeded_bytes(0x99, block * 8 + 3);
  new_file1.extend_from_slice(&seeded_bytes(0x2, block * 7 + 12));

  write_tree(
    old_dir.path(),
    &[
      ("subdir/file-1", &old_subfile),
      ("file-1", &old_file1),
      ("dir2/file-2", &seeded_bytes(0x3, block + 5)),
    ],
  );
  write_tree(
    new_dir.path(),
    &[
      ("subdir/file-1", &new_subfile),
      ("file-1", &new_file1),
      ("dir2/file-2", &seeded_bytes(0x33, block + 5)),
    ],
  );

  let patch = diff_dirs(old_dir.path(), new_dir.path(), &codecs);
  apply_patch(&patch, old_dir.path(), out_dir.path(), &codecs);
  assert_eq!(fs::read(out_dir.path().join("subdir/file-1")).unwrap(), new_subfile);
  assert_eq!(fs::read(out_dir.path().join("file-1")).unwrap(), new_file1);

  let seq_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 0);
  let par_out = rediff_bytes(&patch, old_dir.path(), new_dir.path(), &codecs, 4);
  assert_eq!(seq_out, par_out, "sequential and parallel rediff must agree byte-for-byte");

  assert!(
    seq_out.len() < patch.len(),
    "rediff should still tighten the patch further ({} >= {})",
    seq_out.len(),
    patch.len()
  );

  let rediffed_out = tempfile::tempdir().unwrap();
  apply_patch(&seq_out, old_dir.path(), rediffed_out.path(), &codecs);
  assert_eq!(
    fs::read(rediffed_out.path().join("subdir/file-1")).unwrap(),
    new_subfile
  );
  assert_eq!(fs::read(rediffed_out.path().join("file-1")).unwrap(), new_file1);
}
