use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to allocate {count} elements of {elem_size} bytes")]
pub struct AllocError {
    pub count: usize,
    pub elem_size: usize,
}

/// Allocates `count` default-initialized elements, reporting failure
/// instead of aborting the process.
pub fn checked_calloc<T: Default>(count: usize) -> Result<Vec<T>, AllocError> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(count).is_err() {
        let err = AllocError {
            count,
            elem_size: std::mem::size_of::<T>(),
        };
        log::error!("{}", err);
        return Err(err);
    }
    buf.resize_with(count, T::default);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized() {
        let buf = checked_calloc::<u64>(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&x| x == 0));
        assert!(checked_calloc::<u8>(0).unwrap().is_empty());
    }

    #[test]
    fn oversized_request_fails() {
        let err = checked_calloc::<u64>(usize::MAX / 2).unwrap_err();
        assert_eq!(err.count, usize::MAX / 2);
        assert_eq!(err.elem_size, 8);
    }
}
