use crate::{Cell, Columns, Error, RasterSize, Result, Rows};

/// Row major grid of samples.
/// The data is immutable once constructed, so shared references can be handed to many readers at once.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray<T> {
    size: RasterSize,
    data: Vec<T>,
}

impl<T: Copy> DenseArray<T> {
    pub fn new(size: RasterSize, data: Vec<T>) -> Result<Self> {
        if data.len() != size.cell_count() {
            return Err(Error::InvalidArgument(format!(
                "Data length {} does not match raster size {size}",
                data.len()
            )));
        }

        Ok(DenseArray { size, data })
    }

    pub fn filled_with(val: T, size: RasterSize) -> Self {
        DenseArray {
            size,
            data: vec![val; size.cell_count()],
        }
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn rows(&self) -> Rows {
        self.size.rows
    }

    pub fn columns(&self) -> Columns {
        self.size.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copies the sub grid of `size` starting at `origin`.
    /// Cells of the window that fall outside of the array are set to `fill`.
    pub fn window(&self, origin: Cell, size: RasterSize, fill: T) -> DenseArray<T> {
        let mut data = Vec::with_capacity(size.cell_count());
        let cols = self.size.cols.count();

        for row in origin.row..origin.row + size.rows.count() {
            if row >= self.size.rows.count() {
                data.resize(data.len() + size.cols.count(), fill);
                continue;
            }

            let src_start = row * cols + origin.col.min(cols);
            let src_end = row * cols + (origin.col + size.cols.count()).min(cols);
            data.extend_from_slice(&self.data[src_start..src_end]);
            data.resize(data.len() + size.cols.count() - (src_end - src_start), fill);
        }

        DenseArray { size, data }
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> DenseArray<U> {
        DenseArray {
            size: self.size,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl<T: Copy> std::ops::Index<Cell> for DenseArray<T> {
    type Output = T;

    fn index(&self, cell: Cell) -> &Self::Output {
        &self.data[cell.index_in_raster(self.size.cols.count())]
    }
}
