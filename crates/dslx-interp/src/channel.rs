//! Channel queues shared by the instances of one proc network.

use std::collections::VecDeque;

use dslx_types::ast::ChannelDirection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::value::{ChannelRef, ConcreteType, Value};

/// Queueing policy of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// Unbounded FIFO.
    #[default]
    None,
    /// Ready/valid handshake: at most one value in flight; a `send` blocks
    /// until the previous value has been received.
    ReadyValid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    pub id: u32,
    /// Where the channel was declared, e.g. `first_level_proc#0@5:31`.
    pub name: String,
    pub payload: ConcreteType,
    pub flow_control: FlowControl,
    #[serde(skip)]
    queue: VecDeque<Value>,
    pub sent: u64,
    pub received: u64,
}

impl Channel {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a `send` must wait under this channel's policy.
    pub fn is_full(&self) -> bool {
        self.flow_control == FlowControl::ReadyValid && !self.queue.is_empty()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.queue.front()
    }
}

/// Every channel of a network, indexed by id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a channel and return its (send, receive) endpoints.
    pub fn allocate(
        &mut self,
        name: impl Into<String>,
        payload: ConcreteType,
        flow_control: FlowControl,
    ) -> (ChannelRef, ChannelRef) {
        let id = self.channels.len() as u32;
        let name = name.into();
        debug!(id, name = %name, payload = %payload, "channel allocated");
        self.channels.push(Channel {
            id,
            name,
            payload,
            flow_control,
            queue: VecDeque::new(),
            sent: 0,
            received: 0,
        });
        (
            ChannelRef {
                id,
                direction: ChannelDirection::Out,
            },
            ChannelRef {
                id,
                direction: ChannelDirection::In,
            },
        )
    }

    pub fn get(&self, id: u32) -> Option<&Channel> {
        self.channels.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Enqueue; returns `false` for an unknown id.
    pub fn push(&mut self, id: u32, value: Value) -> bool {
        match self.channels.get_mut(id as usize) {
            Some(channel) => {
                channel.queue.push_back(value);
                channel.sent += 1;
                true
            }
            None => false,
        }
    }

    /// Dequeue the oldest value, if any.
    pub fn pop(&mut self, id: u32) -> Option<Value> {
        let channel = self.channels.get_mut(id as usize)?;
        let value = channel.queue.pop_front()?;
        channel.received += 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut table = ChannelTable::new();
        let (tx, rx) = table.allocate("c", ConcreteType::bool(), FlowControl::None);
        assert_eq!(tx.id, rx.id);
        assert!(table.push(tx.id, Value::u32(1)));
        assert!(table.push(tx.id, Value::u32(2)));
        assert_eq!(table.pop(rx.id), Some(Value::u32(1)));
        assert_eq!(table.pop(rx.id), Some(Value::u32(2)));
        assert_eq!(table.pop(rx.id), None);
        let channel = table.get(rx.id).expect("channel");
        assert_eq!((channel.sent, channel.received), (2, 2));
    }

    #[test]
    fn test_ready_valid_holds_one_value() {
        let mut table = ChannelTable::new();
        let (tx, _) = table.allocate("c", ConcreteType::bool(), FlowControl::ReadyValid);
        assert!(!table.get(tx.id).expect("channel").is_full());
        table.push(tx.id, Value::bool(true));
        assert!(table.get(tx.id).expect("channel").is_full());
    }

    #[test]
    fn test_unknown_id() {
        let mut table = ChannelTable::new();
        assert!(!table.push(7, Value::Token));
        assert_eq!(table.pop(7), None);
    }
}
