use std::collections::HashMap;
use std::sync::Arc;

/// Registration order of a hook list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Most recently registered first
    Lifo,
    /// First registered first
    Fifo,
}

/// Hooks of one kind: a global list plus per-id lists
pub struct HookCalls<T: ?Sized> {
    order: Order,
    global: Vec<Arc<T>>,
    by_id: HashMap<String, Vec<Arc<T>>>,
}

impl<T: ?Sized> HookCalls<T> {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            global: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn add(&mut self, call: Arc<T>) {
        push(&mut self.global, call, self.order);
    }

    pub fn add_for(&mut self, id: impl Into<String>, call: Arc<T>) {
        let order = self.order;
        push(self.by_id.entry(id.into()).or_default(), call, order);
    }

    /// Hooks that apply to `id`, in invocation order
    pub fn calls_for(&self, id: &str) -> Vec<Arc<T>> {
        self.global
            .iter()
            .chain(self.by_id.get(id).into_iter().flatten())
            .cloned()
            .collect()
    }

    /// Ids that have scoped registrations
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.by_id.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_id.values().all(Vec::is_empty)
    }
}

fn push<T: ?Sized>(list: &mut Vec<Arc<T>>, call: Arc<T>, order: Order) {
    match order {
        Order::Lifo => list.insert(0, call),
        Order::Fifo => list.push(call),
    }
}

impl<T: ?Sized> Clone for HookCalls<T> {
    fn clone(&self) -> Self {
        Self {
            order: self.order,
            global: self.global.clone(),
            by_id: self.by_id.clone(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for HookCalls<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookCalls")
            .field("order", &self.order)
            .field("global", &self.global.len())
            .field("ids", &self.by_id.keys().collect::<Vec<_>>())
            .finish()
    }
}
