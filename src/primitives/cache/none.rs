use bytes::Bytes;

use super::BlockCache;

/// Cache that never stores anything; every read misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl BlockCache for NoCache {
    fn read(&mut self, _offset: u64, _len: usize) -> Option<Bytes> {
        None
    }

    fn update(&mut self, _offset: u64, _block: Bytes) {}

    fn remove(&mut self, _offset: u64) {}

    fn contains(&self, _offset: u64) -> bool {
        false
    }

    fn peek(&self, _offset: u64) -> Option<&Bytes> {
        None
    }

    fn len(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }
}
