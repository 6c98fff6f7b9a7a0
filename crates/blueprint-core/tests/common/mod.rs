//! Operators shared by the integration tests.
#![allow(dead_code)]

use blueprint_core::{
    Characteristic, Characteristics, DataCreation, OperatorError, OperatorResult, Template,
    Transform, TransactionOperator,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub type Pos = (i32, i32, i32);
pub type Block = &'static str;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn template(entries: &[(Pos, Block)]) -> Template<Pos, Block> {
    entries.iter().copied().collect()
}

/// Creates the listed positions in order. `None` data means keep existing.
pub struct Fill {
    pending: Mutex<VecDeque<(Pos, Option<Block>)>>,
    data: Mutex<HashMap<Pos, Option<Block>>>,
}

impl Fill {
    pub fn new(entries: &[(Pos, Option<Block>)]) -> Self {
        Self {
            pending: Mutex::new(entries.iter().copied().collect()),
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl TransactionOperator<Pos, Block> for Fill {
    fn name(&self) -> &str {
        "fill"
    }

    fn characteristics(&self) -> Characteristics {
        Characteristic::CreateData.into()
    }

    fn create_pos(&self) -> OperatorResult<Option<Pos>> {
        let next = self.pending.lock().unwrap().pop_front();
        Ok(next.map(|(pos, data)| {
            self.data.lock().unwrap().insert(pos, data);
            pos
        }))
    }

    fn create_data_for_pos(&self, pos: &Pos) -> OperatorResult<DataCreation<Block>> {
        match self.data.lock().unwrap().get(pos) {
            Some(Some(block)) => Ok(DataCreation::Produce(*block)),
            Some(None) => Ok(DataCreation::KeepExisting),
            None => Err(OperatorError::failed(format!("{:?} was never created", pos))),
        }
    }
}

/// Maps data values; unlisted values pass through, `None` removes.
pub struct Replace {
    mapping: HashMap<Block, Option<Block>>,
}

impl Replace {
    pub fn new(mapping: &[(Block, Option<Block>)]) -> Self {
        Self {
            mapping: mapping.iter().copied().collect(),
        }
    }
}

impl TransactionOperator<Pos, Block> for Replace {
    fn characteristics(&self) -> Characteristics {
        Characteristic::TransformData.into()
    }

    fn transform_data(&self, data: &Block) -> OperatorResult<Transform<Block>> {
        Ok(match self.mapping.get(data) {
            Some(mapped) => Transform::from(*mapped),
            None => Transform::Produce(*data),
        })
    }
}

/// Removes the listed positions.
pub struct Erase(pub HashSet<Pos>);

impl TransactionOperator<Pos, Block> for Erase {
    fn characteristics(&self) -> Characteristics {
        Characteristic::TransformPosition.into()
    }

    fn transform_pos(&self, pos: &Pos, _data: &Block) -> OperatorResult<Transform<Pos>> {
        Ok(if self.0.contains(pos) {
            Transform::Remove
        } else {
            Transform::Produce(*pos)
        })
    }
}

/// Translates every position by a fixed offset.
pub struct Shift(pub Pos);

impl TransactionOperator<Pos, Block> for Shift {
    fn characteristics(&self) -> Characteristics {
        Characteristic::TransformPosition.into()
    }

    fn transform_pos(&self, pos: &Pos, _data: &Block) -> OperatorResult<Transform<Pos>> {
        Ok(Transform::Produce((
            pos.0 + self.0 .0,
            pos.1 + self.0 .1,
            pos.2 + self.0 .2,
        )))
    }
}

/// Counts every callback invocation while behaving as the identity.
#[derive(Default)]
pub struct Recorder {
    pub declared: Characteristics,
    pub create_pos: AtomicUsize,
    pub create_data: AtomicUsize,
    pub transform_data: AtomicUsize,
    pub transform_pos: AtomicUsize,
    pub seen_data: Mutex<Vec<Block>>,
    pub seen_pairs: Mutex<Vec<(Pos, Block)>>,
}

impl Recorder {
    pub fn declaring(declared: Characteristics) -> Self {
        Self {
            declared,
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl TransactionOperator<Pos, Block> for Recorder {
    fn characteristics(&self) -> Characteristics {
        self.declared
    }

    fn create_pos(&self) -> OperatorResult<Option<Pos>> {
        self.create_pos.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn create_data_for_pos(&self, _pos: &Pos) -> OperatorResult<DataCreation<Block>> {
        self.create_data.fetch_add(1, Ordering::SeqCst);
        Ok(DataCreation::KeepExisting)
    }

    fn transform_data(&self, data: &Block) -> OperatorResult<Transform<Block>> {
        self.transform_data.fetch_add(1, Ordering::SeqCst);
        self.seen_data.lock().unwrap().push(*data);
        Ok(Transform::Produce(*data))
    }

    fn transform_pos(&self, pos: &Pos, data: &Block) -> OperatorResult<Transform<Pos>> {
        self.transform_pos.fetch_add(1, Ordering::SeqCst);
        self.seen_pairs.lock().unwrap().push((*pos, *data));
        Ok(Transform::Produce(*pos))
    }
}
