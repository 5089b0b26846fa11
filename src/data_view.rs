use bytes::Bytes;

/// A borrowed or owned contiguous byte range.
///
/// Borrowed views never outlive the call that produced them; `save` yields a
/// reference-counted immutable copy that can cross those boundaries (and is
/// cheap when the view is already owned).
#[derive(Debug, Clone)]
pub struct DataView<'a> {
    inner: Inner<'a>,
}

#[derive(Debug, Clone)]
enum Inner<'a> {
    Borrowed(&'a [u8]),
    Saved(Bytes),
}

impl<'a> DataView<'a> {
    pub fn new(data: &'a [u8]) -> DataView<'a> {
        DataView {
            inner: Inner::Borrowed(data),
        }
    }

    pub fn from_bytes(bytes: Bytes) -> DataView<'static> {
        DataView {
            inner: Inner::Saved(bytes),
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.inner {
            Inner::Borrowed(data) => data,
            Inner::Saved(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// The suffix `[suffix_index, len)`.
    ///
    /// # Panics
    ///
    /// Panics if `suffix_index` is out of range.
    pub fn slice(&self, suffix_index: usize) -> DataView<'_> {
        assert!(
            suffix_index <= self.len(),
            "suffix index {} is larger than data length {}",
            suffix_index,
            self.len()
        );

        match &self.inner {
            Inner::Borrowed(data) => DataView::new(&data[suffix_index..]),
            Inner::Saved(bytes) => DataView::from_bytes(bytes.slice(suffix_index..)),
        }
    }

    /// An owned copy of the view; cheap when the view is already owned.
    pub fn save(&self) -> Bytes {
        match &self.inner {
            Inner::Borrowed(data) => Bytes::copy_from_slice(data),
            Inner::Saved(bytes) => bytes.clone(),
        }
    }
}

impl<'a> From<&'a [u8]> for DataView<'a> {
    fn from(data: &'a [u8]) -> DataView<'a> {
        DataView::new(data)
    }
}

impl<'a> From<&'a str> for DataView<'a> {
    fn from(data: &'a str) -> DataView<'a> {
        DataView::new(data.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::DataView;

    #[test]
    fn slice_is_a_suffix() {
        let view = DataView::from("hello world");

        assert_eq!(view.slice(6).data(), b"world");
        assert_eq!(view.slice(11).len(), 0);
        assert_eq!(view.slice(0).data(), b"hello world");
    }

    #[test]
    #[should_panic]
    fn slice_out_of_range() {
        let _ = DataView::from("abc").slice(4);
    }

    #[test]
    fn save_is_stable() {
        let saved = {
            let buf = b"abc".to_vec();
            DataView::new(&buf).save()
        };

        assert_eq!(&saved[..], b"abc");

        // Saving an owned view does not copy.
        let view = DataView::from_bytes(saved.clone());
        let again = view.save();
        assert_eq!(saved.as_ptr(), again.as_ptr());
    }
}
