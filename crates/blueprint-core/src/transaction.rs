//! Transaction: single-use coordinator running registered operators over a template
//!
//! Execution runs four phases in order: position creation, data creation,
//! data transformation, position transformation. The last two are either fused
//! into one traversal of the working template or run as two passes; both
//! strategies produce the same template.
use crate::context::TransactionConfig;
use crate::error::{OperatorError, Phase, TransactionError};
use crate::operator::{Characteristic, Characteristics, DataCreation, Transform, TransactionOperator};
use crate::report::{ExecutionOutcome, ExecutionReport, Strategy};
use crate::template::{Data, Position, Template, TemplateSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

pub type SharedOperator<P, D> = Arc<dyn TransactionOperator<P, D>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Accepting operators; `execute` not called yet
    Open,
    Executing,
    /// Terminal
    Consumed,
}

enum State<P: Position, D: Data> {
    Open(Vec<SharedOperator<P, D>>),
    Executing,
    Consumed,
}

/// Applies an ordered list of operators to a backing template, exactly once.
///
/// ```
/// use blueprint_core::{Template, Transaction};
///
/// let source: Template<u32, &str> = [(1, "oak"), (2, "birch")].into_iter().collect();
/// let tx = Transaction::new(source.clone());
/// let result = tx.execute().unwrap();
/// assert_eq!(result, source);
/// assert!(tx.execute().is_err());
/// ```
pub struct Transaction<P: Position, D: Data> {
    source: Arc<dyn TemplateSource<P, D>>,
    config: TransactionConfig,
    state: Mutex<State<P, D>>,
}

impl<P: Position, D: Data> Transaction<P, D> {
    pub fn new<S>(source: S) -> Self
    where
        S: TemplateSource<P, D> + 'static,
    {
        Self::with_config(source, TransactionConfig::default())
    }

    pub fn with_config<S>(source: S, config: TransactionConfig) -> Self
    where
        S: TemplateSource<P, D> + 'static,
    {
        Self::from_shared(Arc::new(source), config)
    }

    pub fn from_shared(source: Arc<dyn TemplateSource<P, D>>, config: TransactionConfig) -> Self {
        Self {
            source,
            config,
            state: Mutex::new(State::Open(Vec::new())),
        }
    }

    /// Register an operator. Does not run it; see [`execute`](Self::execute).
    pub fn operate<O>(&self, operator: O) -> Result<(), TransactionError>
    where
        O: TransactionOperator<P, D> + 'static,
    {
        self.operate_shared(Arc::new(operator))
    }

    /// Register a shared operator. The same operator may be registered more
    /// than once; each registration runs in turn.
    pub fn operate_shared(&self, operator: SharedOperator<P, D>) -> Result<(), TransactionError> {
        match &mut *self.state.lock() {
            State::Open(operators) => {
                operators.push(operator);
                Ok(())
            }
            State::Executing | State::Consumed => Err(TransactionError::AlreadyConsumed),
        }
    }

    pub fn state(&self) -> TransactionState {
        match &*self.state.lock() {
            State::Open(_) => TransactionState::Open,
            State::Executing => TransactionState::Executing,
            State::Consumed => TransactionState::Consumed,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.state() == TransactionState::Consumed
    }

    /// Operators registered and waiting for `execute`.
    pub fn operator_count(&self) -> usize {
        match &*self.state.lock() {
            State::Open(operators) => operators.len(),
            _ => 0,
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Run every registered operator and return the resulting template.
    ///
    /// The transaction is consumed by the first call whatever its outcome;
    /// later calls fail with [`TransactionError::AlreadyConsumed`], and a call
    /// racing an in-progress execution fails with
    /// [`TransactionError::ConcurrentExecution`].
    pub fn execute(&self) -> Result<Template<P, D>, TransactionError> {
        self.execute_with_report().map(|outcome| outcome.template)
    }

    /// Same as [`execute`](Self::execute), also returning execution statistics.
    pub fn execute_with_report(&self) -> Result<ExecutionOutcome<P, D>, TransactionError> {
        let operators = self.begin()?;
        let _consumed = ConsumeOnDrop(&self.state);

        let span = tracing::info_span!(
            "transaction.execute",
            trace_id = %self.config.trace_id,
            label = %self.config.label,
        );
        let _enter = span.enter();
        let start = Instant::now();

        let engine = Engine::new(&*self.source, &self.config, &operators);
        match engine.run() {
            Ok(mut outcome) => {
                outcome.report.latency_ms = start.elapsed().as_millis() as u64;
                let report = &outcome.report;
                info!(
                    strategy = ?report.strategy,
                    input = report.input_size,
                    output = report.output_size,
                    removed = report.positions_removed,
                    latency_ms = report.latency_ms,
                    "transaction executed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "transaction failed");
                Err(err)
            }
        }
    }

    fn begin(&self) -> Result<Vec<SharedOperator<P, D>>, TransactionError> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Executing) {
            State::Open(operators) => Ok(operators),
            State::Executing => Err(TransactionError::ConcurrentExecution),
            State::Consumed => {
                *state = State::Consumed;
                Err(TransactionError::AlreadyConsumed)
            }
        }
    }
}

impl<P: Position, D: Data> fmt::Debug for Transaction<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("label", &self.config.label)
            .field("state", &self.state())
            .field("operators", &self.operator_count())
            .finish()
    }
}

/// Marks the transaction consumed when execution ends, including by panic.
struct ConsumeOnDrop<'a, P: Position, D: Data>(&'a Mutex<State<P, D>>);

impl<P: Position, D: Data> Drop for ConsumeOnDrop<'_, P, D> {
    fn drop(&mut self) {
        *self.0.lock() = State::Consumed;
    }
}

struct Registered<'a, P: Position, D: Data> {
    operator: &'a dyn TransactionOperator<P, D>,
    index: usize,
    characteristics: Characteristics,
}

impl<P: Position, D: Data> Registered<'_, P, D> {
    fn failure(&self, phase: Phase, source: OperatorError) -> TransactionError {
        TransactionError::OperatorFailure {
            operator: self.operator.name().to_string(),
            index: self.index,
            phase,
            source,
        }
    }

    fn declares(&self, characteristic: Characteristic) -> bool {
        self.characteristics.contains(characteristic)
    }
}

struct Engine<'a, P: Position, D: Data> {
    source: &'a dyn TemplateSource<P, D>,
    config: &'a TransactionConfig,
    operators: Vec<Registered<'a, P, D>>,
    /// Indices of operators declaring `TransformData`, in registration order
    data_stage: Vec<usize>,
    /// Indices of operators declaring `TransformPosition`, in registration order
    pos_stage: Vec<usize>,
}

impl<'a, P: Position, D: Data> Engine<'a, P, D> {
    fn new(
        source: &'a dyn TemplateSource<P, D>,
        config: &'a TransactionConfig,
        operators: &'a [SharedOperator<P, D>],
    ) -> Self {
        let operators: Vec<_> = operators
            .iter()
            .enumerate()
            .map(|(index, operator)| Registered {
                operator: operator.as_ref(),
                index,
                characteristics: operator.characteristics(),
            })
            .collect();
        let stage = |characteristic| {
            operators
                .iter()
                .filter(|r| r.declares(characteristic))
                .map(|r| r.index)
                .collect::<Vec<_>>()
        };
        let data_stage = stage(Characteristic::TransformData);
        let pos_stage = stage(Characteristic::TransformPosition);

        Self {
            source,
            config,
            operators,
            data_stage,
            pos_stage,
        }
    }

    fn run(self) -> Result<ExecutionOutcome<P, D>, TransactionError> {
        let mut report =
            ExecutionReport::start(&self.config.trace_id, &self.config.label, self.operators.len());

        let inert = self.operators.iter().all(|r| r.characteristics.is_empty());
        if inert && self.config.reuse_unchanged_source {
            if let Some(template) = self.source.snapshot() {
                debug!("no operator declares a characteristic, reusing source");
                report.strategy = Strategy::Reused;
                report.input_size = template.len();
                report.output_size = template.len();
                report.distinct_data = template.distinct_data().len();
                return Ok(ExecutionOutcome { template, report });
            }
        }

        let created = self.create_positions(&mut report)?;
        let overlay = self.create_data(created, &mut report)?;

        let template = if self.config.fuse_transforms {
            report.strategy = Strategy::Fused;
            self.transform_fused(&overlay, &mut report)?
        } else {
            report.strategy = Strategy::TwoPass;
            self.transform_two_pass(&overlay, &mut report)?
        };
        report.output_size = template.len();

        Ok(ExecutionOutcome { template, report })
    }

    /// Phase 1: drain `create_pos` of every creating operator, in order.
    fn create_positions(
        &self,
        report: &mut ExecutionReport,
    ) -> Result<Vec<(usize, P)>, TransactionError> {
        let mut created = Vec::new();
        for registered in &self.operators {
            if !registered.declares(Characteristic::CreateData) {
                continue;
            }
            while let Some(pos) = registered
                .operator
                .create_pos()
                .map_err(|e| registered.failure(Phase::CreatePosition, e))?
            {
                if let Some(limit) = self.config.max_created_positions {
                    if created.len() >= limit {
                        return Err(TransactionError::execution(format!(
                            "{}#{} exceeded the limit of {} created positions",
                            registered.operator.name(),
                            registered.index,
                            limit
                        )));
                    }
                }
                created.push((registered.index, pos));
            }
        }

        report.positions_created = created.len();
        debug!(count = created.len(), "positions created");
        Ok(created)
    }

    /// Phase 2: ask the owning operator for data at each created position.
    /// Later creations of the same position overwrite earlier ones.
    fn create_data(
        &self,
        created: Vec<(usize, P)>,
        report: &mut ExecutionReport,
    ) -> Result<BTreeMap<P, D>, TransactionError> {
        let mut overlay = BTreeMap::new();
        for (index, pos) in created {
            let registered = &self.operators[index];
            let creation = registered
                .operator
                .create_data_for_pos(&pos)
                .map_err(|e| registered.failure(Phase::CreateData, e))?;

            match creation {
                DataCreation::Produce(data) => {
                    overlay.insert(pos, data);
                    report.data_created += 1;
                }
                DataCreation::KeepExisting => {
                    if !overlay.contains_key(&pos) && self.lookup(&pos)?.is_none() {
                        return Err(TransactionError::ContractViolation {
                            operator: registered.operator.name().to_string(),
                            index,
                            position: format!("{:?}", pos),
                        });
                    }
                    report.data_kept += 1;
                }
            }
        }

        debug!(
            created = report.data_created,
            kept = report.data_kept,
            "data created"
        );
        Ok(overlay)
    }

    /// Phases 3 and 4 in one traversal. Data chains are memoized so each
    /// distinct value is transformed exactly once.
    fn transform_fused(
        &self,
        overlay: &BTreeMap<P, D>,
        report: &mut ExecutionReport,
    ) -> Result<Template<P, D>, TransactionError> {
        let mut memo: HashMap<D, Option<D>> = HashMap::new();
        let mut output = BTreeMap::new();
        let mut input_size = 0;

        for (pos, data) in self.working_entries(overlay, &mut input_size)? {
            let transformed = match memo.get(data) {
                Some(cached) => cached.clone(),
                None => {
                    let result = self.transform_data(data)?;
                    if result.is_none() {
                        report.data_removed += 1;
                    }
                    memo.insert(data.clone(), result.clone());
                    result
                }
            };

            match transformed {
                Some(data) => self.place(&mut output, pos, data, report)?,
                None => {
                    trace!(?pos, "position removed with its data");
                    report.positions_removed += 1;
                }
            }
        }

        report.input_size = input_size;
        report.distinct_data = memo.len();
        Ok(Template::from_map(output))
    }

    /// Phases 3 and 4 as separate passes: collect distinct data in order of
    /// first appearance, transform it, then map every position.
    fn transform_two_pass(
        &self,
        overlay: &BTreeMap<P, D>,
        report: &mut ExecutionReport,
    ) -> Result<Template<P, D>, TransactionError> {
        let mut input_size = 0;
        let mut seen = HashSet::new();
        let distinct: Vec<&D> = self
            .working_entries(overlay, &mut input_size)?
            .map(|(_, data)| data)
            .filter(|data| seen.insert(*data))
            .collect();

        let mut mapped: HashMap<&D, Option<D>> = HashMap::with_capacity(distinct.len());
        for data in distinct {
            let result = self.transform_data(data)?;
            if result.is_none() {
                report.data_removed += 1;
            }
            mapped.insert(data, result);
        }
        debug!(distinct = mapped.len(), "data transformed");

        let mut output = BTreeMap::new();
        let mut revisited = 0;
        for (pos, data) in self.working_entries(overlay, &mut revisited)? {
            match mapped.get(data).cloned().flatten() {
                Some(data) => self.place(&mut output, pos, data, report)?,
                None => {
                    trace!(?pos, "position removed with its data");
                    report.positions_removed += 1;
                }
            }
        }

        report.input_size = input_size;
        report.distinct_data = mapped.len();
        Ok(Template::from_map(output))
    }

    /// Source entries not overwritten by creation, followed by created entries.
    fn working_entries<'s, 'c>(
        &'s self,
        overlay: &'s BTreeMap<P, D>,
        source_count: &'c mut usize,
    ) -> Result<impl Iterator<Item = (&'s P, &'s D)> + 'c, TransactionError>
    where
        's: 'c,
    {
        let entries = self
            .source
            .entries()
            .map_err(|e| TransactionError::source_failure("template iteration failed", e))?;

        Ok(entries
            .inspect(move |_| *source_count += 1)
            .filter(move |(pos, _)| !overlay.contains_key(*pos))
            .chain(overlay.iter()))
    }

    fn lookup(&self, pos: &P) -> Result<Option<&D>, TransactionError> {
        self.source
            .lookup(pos)
            .map_err(|e| TransactionError::source_failure("template lookup failed", e))
    }

    /// Compose `transform_data` across the data stage. `None` means removed.
    fn transform_data(&self, data: &D) -> Result<Option<D>, TransactionError> {
        let mut current = data.clone();
        for &index in &self.data_stage {
            let registered = &self.operators[index];
            match registered
                .operator
                .transform_data(&current)
                .map_err(|e| registered.failure(Phase::TransformData, e))?
            {
                Transform::Produce(next) => current = next,
                Transform::Remove => {
                    trace!(?data, operator = registered.operator.name(), "data removed");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// Compose `transform_pos` across the position stage. `None` means removed.
    fn transform_pos(&self, pos: &P, data: &D) -> Result<Option<P>, TransactionError> {
        let mut current = pos.clone();
        for &index in &self.pos_stage {
            let registered = &self.operators[index];
            match registered
                .operator
                .transform_pos(&current, data)
                .map_err(|e| registered.failure(Phase::TransformPosition, e))?
            {
                Transform::Produce(next) => current = next,
                Transform::Remove => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn place(
        &self,
        output: &mut BTreeMap<P, D>,
        pos: &P,
        data: D,
        report: &mut ExecutionReport,
    ) -> Result<(), TransactionError> {
        let Some(target) = self.transform_pos(pos, &data)? else {
            trace!(?pos, "position removed");
            report.positions_removed += 1;
            return Ok(());
        };

        if &target != pos {
            report.positions_moved += 1;
        }
        if output.insert(target, data).is_some() {
            trace!(?pos, "moved onto an occupied position");
            report.collisions += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorResult;
    use crate::ErrorKind;

    struct Upper;

    impl TransactionOperator<u8, char> for Upper {
        fn characteristics(&self) -> Characteristics {
            Characteristic::TransformData.into()
        }

        fn transform_data(&self, data: &char) -> OperatorResult<Transform<char>> {
            Ok(Transform::Produce(data.to_ascii_uppercase()))
        }
    }

    fn source() -> Template<u8, char> {
        [(1, 'a'), (2, 'b')].into_iter().collect()
    }

    #[test]
    fn test_state_transitions() {
        let tx = Transaction::new(source());
        assert_eq!(tx.state(), TransactionState::Open);
        tx.operate(Upper).unwrap();
        tx.operate(Upper).unwrap();
        assert_eq!(tx.operator_count(), 2);

        let result = tx.execute().unwrap();
        assert_eq!(result.get(&1), Some(&'A'));
        assert_eq!(tx.state(), TransactionState::Consumed);
        assert!(tx.is_consumed());
        assert_eq!(tx.operator_count(), 0);
    }

    #[test]
    fn test_consumed_rejects_everything() {
        let tx = Transaction::new(source());
        tx.execute().unwrap();

        assert_eq!(tx.execute().unwrap_err().kind(), ErrorKind::AlreadyConsumed);
        assert_eq!(tx.operate(Upper).unwrap_err().kind(), ErrorKind::AlreadyConsumed);
        assert_eq!(
            tx.execute_with_report().unwrap_err().kind(),
            ErrorKind::AlreadyConsumed
        );
    }

    #[test]
    fn test_no_operators_reuses_source() {
        let template = source();
        let tx = Transaction::new(template.clone());
        let outcome = tx.execute_with_report().unwrap();
        assert!(outcome.template.ptr_eq(&template));
        assert_eq!(outcome.report.strategy, Strategy::Reused);
        assert_eq!(outcome.report.input_size, 2);
    }

    #[test]
    fn test_debug_output() {
        let tx = Transaction::with_config(source(), TransactionConfig::new("rotate"));
        tx.operate(Upper).unwrap();
        let debug = format!("{:?}", tx);
        assert!(debug.contains("rotate"));
        assert!(debug.contains("Open"));
        assert!(debug.contains("operators: 1"));
    }
}
