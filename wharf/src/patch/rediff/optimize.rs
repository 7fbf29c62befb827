//! Build a bsdiff-style control stream for a single file by greedily matching
//! runs of the new (target) file's bytes against a suffix array of the old
//! (source) file.

use crate::protos::bsdiff;

use suffix_array::SuffixArray;

/// Matches shorter than this aren't worth the `Control` message overhead of
/// breaking out of the current literal run.
const MIN_MATCH_LEN: usize = 16;

/// Build the control stream that turns `source` into `target`.
///
/// This is a simplified, single-pass greedy matcher: at each position in
/// `target`, the suffix array is used to find the longest prefix of the
/// remaining target bytes that also occurs somewhere in `source`. Each
/// control carries exactly one of the two reconstruction modes a consumer
/// applies in sequence (add bytes read from `source` at the current cursor,
/// then literal `copy` bytes written as-is) rather than both for the same
/// span: a match of at least [`MIN_MATCH_LEN`] bytes becomes a `seek` +
/// zero-delta `add` (an exact copy needs no diff bytes and advances the
/// source cursor to just past the match); everything else accumulates into a
/// `copy`-only literal run with an empty `add`, so it never touches the
/// source cursor.
#[must_use]
pub fn build_controls(target: &[u8], source: &[u8]) -> Vec<bsdiff::Control> {
  if source.is_empty() {
    return literal_only(target);
  }

  let sa = SuffixArray::new(source);

  let mut controls = Vec::new();
  let mut target_cursor: usize = 0;
  let mut source_cursor: i64 = 0;
  let mut literal: Vec<u8> = Vec::new();

  while target_cursor < target.len() {
    let remaining = &target[target_cursor..];
    let best_match = longest_match(&sa, source, remaining);

    match best_match {
      Some((match_pos, match_len)) if match_len >= MIN_MATCH_LEN => {
        if !literal.is_empty() {
          controls.push(bsdiff::Control {
            add: Vec::new(),
            copy: std::mem::take(&mut literal),
            seek: 0,
            eof: false,
          });
        }

        let seek = match_pos as i64 - source_cursor;
        controls.push(bsdiff::Control {
          add: vec![0u8; match_len],
          copy: Vec::new(),
          seek,
          eof: false,
        });
        source_cursor = match_pos as i64 + match_len as i64;
        target_cursor += match_len;
      }
      _ => {
        literal.push(remaining[0]);
        target_cursor += 1;
      }
    }
  }

  if !literal.is_empty() {
    controls.push(bsdiff::Control {
      add: Vec::new(),
      copy: literal,
      seek: 0,
      eof: false,
    });
  }

  controls.push(bsdiff::Control {
    add: Vec::new(),
    copy: Vec::new(),
    seek: 0,
    eof: true,
  });

  controls
}

/// When no source bytes exist at all, the whole target is one literal run:
/// a `copy`-only control, since there's nothing to `add` against.
fn literal_only(target: &[u8]) -> Vec<bsdiff::Control> {
  vec![
    bsdiff::Control {
      add: Vec::new(),
      copy: target.to_vec(),
      seek: 0,
      eof: false,
    },
    bsdiff::Control {
      add: Vec::new(),
      copy: Vec::new(),
      seek: 0,
      eof: true,
    },
  ]
}

/// Find the longest run of `needle`'s prefix that occurs in `source`, using
/// the suffix array to binary-search for matching prefixes of increasing
/// length. Returns the match's starting offset in `source` and its length.
fn longest_match(sa: &SuffixArray<'_>, source: &[u8], needle: &[u8]) -> Option<(usize, usize)> {
  let mut best: Option<(usize, usize)> = None;

  // Grow the probed prefix length until no occurrence remains; this is O(log
  // n) suffix array searches of increasing prefix length rather than a true
  // linear-time longest-common-extension walk, trading some optimality for
  // simplicity.
  let mut len = 1usize.min(needle.len());
  while len <= needle.len() {
    let prefix = &needle[..len];
    let hits = sa.search_all(prefix);
    if hits.is_empty() {
      break;
    }
    best = Some((hits[0] as usize, len));

    if len == needle.len() {
      break;
    }
    len = (len * 2).min(needle.len());
  }

  best
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Mirrors [`crate::patch::apply::bsdiff::apply_bsdiff`]'s actual
  /// consumption order: add bytes are read from the source at the current
  /// cursor (advancing it), then copy bytes are appended verbatim (the
  /// cursor doesn't move), and only then does `seek` reposition the cursor
  /// for the next control.
  fn replay(controls: &[bsdiff::Control], source: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut cursor: i64 = 0;

    for control in controls {
      for (i, &add_byte) in control.add.iter().enumerate() {
        let source_byte = usize::try_from(cursor + i as i64)
          .ok()
          .and_then(|idx| source.get(idx))
          .copied()
          .unwrap_or(0);
        out.push(source_byte.wrapping_add(add_byte));
      }
      cursor += control.add.len() as i64;

      out.extend_from_slice(&control.copy);

      cursor += control.seek;

      if control.eof {
        break;
      }
    }

    out
  }

  #[test]
  fn identical_files_replay_as_a_single_copy() {
    let data = b"the quick brown fox jumps over the lazy dog".to_vec();
    let controls = build_controls(&data, &data);
    assert_eq!(replay(&controls, &data), data);
    assert!(controls.last().unwrap().eof);
  }

  #[test]
  fn appended_suffix_replays_correctly() {
    let source = b"the quick brown fox jumps over the lazy dog".to_vec();
    let mut target = source.clone();
    target.extend_from_slice(b" and then some more unrelated tail content follows");

    let controls = build_controls(&target, &source);
    assert_eq!(replay(&controls, &source), target);
  }

  #[test]
  fn unrelated_files_still_replay_via_literal_fallback() {
    let source = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
    let target = b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".to_vec();

    let controls = build_controls(&target, &source);
    assert_eq!(replay(&controls, &source), target);
  }

  #[test]
  fn empty_source_is_pure_literal() {
    let target = b"brand new content".to_vec();
    let controls = build_controls(&target, &[]);
    assert_eq!(replay(&controls, &[]), target);
  }

  #[test]
  fn empty_source_never_emits_an_add_against_nothing() {
    let target = b"brand new content".to_vec();
    let controls = build_controls(&target, &[]);
    assert!(controls.iter().all(|c| c.add.is_empty()));
  }

  #[test]
  fn insertion_between_two_matches_replays_without_duplicating_bytes() {
    let source = [b"A".repeat(20), b"B".repeat(20)].concat();
    let mut target = source[..20].to_vec();
    target.extend_from_slice(b"INSERTEDMIDDLETEXT!!");
    target.extend_from_slice(&source[20..]);

    let controls = build_controls(&target, &source);
    assert_eq!(replay(&controls, &source), target);

    // Each byte of the target is reconstructed by exactly one of (add, copy)
    // per control, never both, so the two streams partition the target.
    let total_add: usize = controls.iter().map(|c| c.add.len()).sum();
    let total_copy: usize = controls.iter().map(|c| c.copy.len()).sum();
    assert_eq!(total_add + total_copy, target.len());
    assert!(controls.iter().all(|c| c.add.is_empty() || c.copy.is_empty()));
  }
}
