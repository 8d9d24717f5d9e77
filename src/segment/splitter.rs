use super::checksum::{Checksum, DigestAlgorithm, RunningChecksum};
use bytes::Bytes;

/// One node's share of a blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 1-based, as carried on the wire.
    pub number: u8,
    pub data: Bytes,
    pub checksum: Checksum,
}

impl Segment {
    /// 0-based ring position.
    pub fn index(&self) -> usize {
        self.number as usize - 1
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of slices `slices(slice_size, ..)` yields.
    pub fn slice_count(&self, slice_size: usize) -> usize {
        self.data.len().div_ceil(slice_size).max(1)
    }

    pub fn slices(&self, slice_size: usize, algorithm: DigestAlgorithm) -> Slices {
        Slices {
            data: self.data.clone(),
            slice_size: slice_size.max(1),
            offset: 0,
            sequence: 0,
            running: RunningChecksum::new(algorithm),
            finished: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub sequence: u32,
    pub data: Bytes,
    /// Running checksum over this slice and every slice before it.
    pub checksum: Checksum,
    pub is_last: bool,
}

impl Slice {
    pub fn is_first(&self) -> bool {
        self.sequence == 0
    }
}

/// Ordered slices of one segment. Not restartable: a retry on another node
/// takes a fresh iterator from [`Segment::slices`].
#[derive(Debug)]
pub struct Slices {
    data: Bytes,
    slice_size: usize,
    offset: usize,
    sequence: u32,
    running: RunningChecksum,
    finished: bool,
}

impl Iterator for Slices {
    type Item = Slice;

    fn next(&mut self) -> Option<Slice> {
        if self.finished {
            return None;
        }

        let end = (self.offset + self.slice_size).min(self.data.len());
        let data = self.data.slice(self.offset..end);
        self.running.update(&data);

        let is_last = end == self.data.len();
        let slice = Slice {
            sequence: self.sequence,
            data,
            checksum: self.running.snapshot(),
            is_last,
        };

        self.offset = end;
        self.sequence += 1;
        self.finished = is_last;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.finished {
            0
        } else {
            (self.data.len() - self.offset).div_ceil(self.slice_size).max(1)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Slices {}

/// Splits `blob` into `node_count` contiguous segments numbered from 1.
///
/// `node_count` must be between 1 and 255. Segment sizes differ by at most
/// one byte: the first `len % N` segments carry one byte more than the rest.
/// Segments are only empty when the blob is shorter than `node_count`.
pub fn split(blob: &Bytes, node_count: usize, algorithm: DigestAlgorithm) -> Vec<Segment> {
    if node_count == 0 {
        return Vec::new();
    }

    let len = blob.len();
    let base = len / node_count;
    let longer = len % node_count;

    let mut start = 0;
    (0..node_count)
        .map(|i| {
            let end = start + base + usize::from(i < longer);
            let data = blob.slice(start..end);
            start = end;
            Segment {
                number: (i + 1) as u8,
                checksum: Checksum::compute(algorithm, &data),
                data,
            }
        })
        .collect()
}

/// Concatenates segments in segment-number order.
pub fn join(segments: &mut [Segment]) -> Bytes {
    segments.sort_by_key(|segment| segment.number);
    let total: usize = segments.iter().map(|segment| segment.len()).sum();
    let mut blob = Vec::with_capacity(total);
    for segment in segments.iter() {
        blob.extend_from_slice(&segment.data);
    }
    Bytes::from(blob)
}
