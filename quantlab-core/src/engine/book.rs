//! Working-order book for one run.
//!
//! Orders are kept in submission order, which is also the matching order.
//! Ids are issued from a per-run counter starting at 1. Terminal orders stay
//! in the book until the driver drains them into the order log.

use crate::domain::{Order, OrderId, OrderSide, OrderType, SymbolId, TimeInForce};

/// What `cancel` should match: one id, or every live order carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    Id(OrderId),
    Tag(String),
}

impl From<OrderId> for CancelTarget {
    fn from(id: OrderId) -> Self {
        CancelTarget::Id(id)
    }
}

impl From<&str> for CancelTarget {
    fn from(tag: &str) -> Self {
        CancelTarget::Tag(tag.to_string())
    }
}

impl From<String> for CancelTarget {
    fn from(tag: String) -> Self {
        CancelTarget::Tag(tag)
    }
}

impl CancelTarget {
    fn matches(&self, order: &Order) -> bool {
        match self {
            CancelTarget::Id(id) => order.id == *id,
            CancelTarget::Tag(tag) => order.tag.as_deref() == Some(tag.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    orders: Vec<Order>,
    next_id: u64,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            next_id: 1,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        symbol_id: SymbolId,
        side: OrderSide,
        quantity: u64,
        order_type: OrderType,
        tif: TimeInForce,
        limit_price: Option<f64>,
        tag: Option<String>,
    ) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        let mut order = Order::new(id, symbol_id, side, quantity, order_type, tif, limit_price);
        order.tag = tag;
        self.orders.push(order);
        id
    }

    /// Cancel every live order matching `target`; returns how many changed.
    pub fn cancel(&mut self, target: &CancelTarget) -> usize {
        self.cancel_where(|o| target.matches(o)).len()
    }

    /// Cancel live orders satisfying `pred`; returns their ids.
    pub fn cancel_where<F>(&mut self, pred: F) -> Vec<OrderId>
    where
        F: Fn(&Order) -> bool,
    {
        let mut canceled = Vec::new();
        for order in self.orders.iter_mut().filter(|o| !o.is_terminal()) {
            if pred(order) {
                order.cancel();
                canceled.push(order.id);
            }
        }
        canceled
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn live(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| !o.is_terminal())
    }

    pub(crate) fn orders_mut(&mut self) -> &mut [Order] {
        &mut self.orders
    }

    /// Remove terminal orders, keeping submission order for both halves.
    pub fn drain_terminal(&mut self) -> Vec<Order> {
        let (done, live): (Vec<Order>, Vec<Order>) =
            std::mem::take(&mut self.orders).into_iter().partition(Order::is_terminal);
        self.orders = live;
        done
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderState;

    fn book_with_three() -> OrderBook {
        let mut book = OrderBook::new();
        for tag in ["a", "b", "a"] {
            book.submit(
                SymbolId(1),
                OrderSide::Buy,
                10,
                OrderType::Market,
                TimeInForce::Day,
                None,
                Some(tag.to_string()),
            );
        }
        book
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let book = book_with_three();
        let ids: Vec<u64> = book.live().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_by_tag_hits_all_matches() {
        let mut book = book_with_three();
        assert_eq!(book.cancel(&"a".into()), 2);
        assert_eq!(book.live().count(), 1);
        assert_eq!(book.get(OrderId(1)).unwrap().state(), OrderState::Canceled);
        // Already canceled orders are not counted twice.
        assert_eq!(book.cancel(&CancelTarget::Id(OrderId(1))), 0);
    }

    #[test]
    fn drain_terminal_keeps_live_orders() {
        let mut book = book_with_three();
        book.cancel(&CancelTarget::Id(OrderId(2)));
        let done = book.drain_terminal();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, OrderId(2));
        let ids: Vec<u64> = book.live().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
