use super::replacement_policy::{Lru, ReplacementPolicy};

/// A fully associative array of slots whose victim selection is delegated to a
/// [`ReplacementPolicy`].
pub struct CacheSet<T, R: ?Sized = Lru> {
    arr: Box<[Option<T>]>,
    rp: R,
}

impl<T, R: ReplacementPolicy> CacheSet<T, R> {
    pub fn new(size: usize) -> Self {
        let mut vec = Vec::with_capacity(size);
        for _ in 0..size {
            vec.push(None);
        }
        CacheSet { arr: vec.into_boxed_slice(), rp: R::new(size) }
    }

    pub fn is_empty(&self) -> bool {
        self.arr.is_empty()
    }

    /// Search in the cache. Returns found entry's index, or an insertion/overwrite pointer.
    ///
    /// The replacement policy is not informed of the access; use [`touch`](Self::touch) for that.
    pub fn find(&mut self, mut matcher: impl FnMut(&T) -> bool) -> Result<usize, usize> {
        for i in 0..self.arr.len() {
            if let Some(entry) = &self.arr[i] {
                if matcher(entry) {
                    return Ok(i);
                }
            }
        }
        Err(self.rp.select())
    }

    pub fn touch(&mut self, ptr: usize) {
        self.rp.touch(ptr);
    }

    /// Place `insert` at `insert_ptr`, returning what was there before.
    pub fn insert(&mut self, insert_ptr: usize, insert: T) -> Option<T> {
        self.rp.insert(insert_ptr);
        std::mem::replace(&mut self.arr[insert_ptr], Some(insert))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.arr.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_replace() {
        let mut set = CacheSet::<u64>::new(2);
        let ptr = set.find(|&x| x == 1).unwrap_err();
        assert_eq!(set.insert(ptr, 1), None);
        let ptr = set.find(|&x| x == 2).unwrap_err();
        assert_eq!(set.insert(ptr, 2), None);
        assert!(set.find(|&x| x == 1).is_ok());

        // 1 is the least recently inserted and has not been touched.
        let ptr = set.find(|&x| x == 3).unwrap_err();
        assert_eq!(set.insert(ptr, 3), Some(1));
        assert_eq!(set.iter().count(), 2);
    }
}
