#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    pub pool_size: usize,
    /// K parameter of the LRU-K replacer.
    pub lru_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            pool_size: 64,
            lru_k: 2,
        }
    }
}
