use async_trait::async_trait;
use engine_core::{connectors::reader::ItemReader, error::ReadError};
use std::collections::VecDeque;

/// Reads items from an in-memory list, front to back.
pub struct ListItemReader<T> {
    items: VecDeque<T>,
}

impl<T> ListItemReader<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl<T> ItemReader<T> for ListItemReader<T>
where
    T: Send + 'static,
{
    async fn read(&mut self) -> Result<Option<T>, ReadError> {
        Ok(self.items.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_in_order_then_stays_exhausted() {
        let mut reader = ListItemReader::new(["a", "b"]);
        assert_eq!(reader.read().await.unwrap(), Some("a"));
        assert_eq!(reader.read().await.unwrap(), Some("b"));
        assert_eq!(reader.read().await.unwrap(), None);
        assert_eq!(reader.read().await.unwrap(), None);
    }
}
