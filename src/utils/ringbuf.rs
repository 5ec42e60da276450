/// 定长环形缓冲区，写满后覆盖最旧的元素
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    read: usize,
    write: usize,
    full: bool,
    /// 被覆盖丢弃的元素个数
    dropped: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(size: usize) -> Self {
        RingBuffer {
            buf: vec![T::default(); size.max(1)],
            read: 0,
            write: 0,
            full: false,
            dropped: 0,
        }
    }

    pub fn push_overwrite(&mut self, item: T) {
        self.buf[self.write] = item;
        self.write = (self.write + 1) % self.buf.len();
        if self.full {
            self.read = self.write;
            self.dropped += 1;
        } else if self.write == self.read {
            self.full = true;
        }
    }

    /// 按从旧到新的顺序复制出所有元素，不消费
    pub fn snapshot(&self) -> Vec<T> {
        (0..self.len())
            .map(|i| self.buf[(self.read + i) % self.buf.len()])
            .collect()
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.full = false;
        self.dropped = 0;
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        if self.full {
            self.buf.len()
        } else {
            (self.write + self.buf.len() - self.read) % self.buf.len()
        }
    }
}
