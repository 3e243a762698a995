/// Concurrent PDSCH processor
///
/// Derives every transmission parameter once, then forks the DM-RS, the
/// optional PT-RS and a set of codeblock batches to a task executor. Batches
/// claim codeblocks from a shared atomic index, last codeblock first, and map
/// them straight into the grid at their precomputed RE offsets. Completion is
/// tracked with two countdowns:
///
/// - the batch counter: the batch that brings it to zero releases the
///   transport block and counts the codeblock work as one finished task;
/// - the task counter (DM-RS, codeblocks, PT-RS): the task that brings it to
///   zero fires the notifier.
///
/// A rejected submission runs on the calling thread instead.

use super::codeblock_processor::PdschCodeblockProcessor;
use super::helpers::{
    allocation_pattern, count_data_re, data_precoding, process_dmrs, process_ptrs, reserved_pattern,
    scrambling_c_init,
};
use super::segmentation::PdschSegmentation;
use super::validator::PdschPduValidator;
use super::{PdschPdu, PdschProcessor, PdschProcessorNotifier, SharedTransportBlock};
use crate::phy::dmrs::DmrsPdschProcessor;
use crate::phy::precoding::PrecodingMatrix;
use crate::phy::ptrs::PtrsPdschGenerator;
use crate::phy::re_pattern::{RePattern, RePatternList};
use crate::phy::resource_grid::ResourceGridWriter;
use crate::phy::resource_grid_mapper::ResourceGridMapper;
use common::{AtomicCounter, ProcessorPool};
use interfaces::TaskExecutor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// State of one transmission, shared by its tasks
struct ProcessContext {
    grid: Arc<dyn ResourceGridWriter>,
    notifier: Arc<dyn PdschProcessorNotifier>,
    data: SharedTransportBlock,
    pdu: PdschPdu,
    segmentation: PdschSegmentation,
    c_init: u32,
    allocation: RePattern,
    reserved: RePatternList,
    /// Precoding with power and modulation scaling applied
    precoding: PrecodingMatrix,
    async_task_counter: AtomicCounter,
    cb_task_counter: AtomicCounter,
    /// Next codeblock to claim, counted from the last one
    cb_counter: AtomicUsize,
    cb_pool: Arc<ProcessorPool<PdschCodeblockProcessor>>,
    dmrs_pool: Arc<ProcessorPool<DmrsPdschProcessor>>,
    ptrs_pool: Arc<ProcessorPool<PtrsPdschGenerator>>,
    mapper: Arc<dyn ResourceGridMapper>,
    busy: Arc<AtomicBool>,
}

impl ProcessContext {
    /// Count one task as finished, notifying if it was the last one
    fn finish_task(&self) {
        if self.async_task_counter.decrement_and_check_zero() {
            self.busy.store(false, Ordering::Release);
            self.notifier.on_finish_processing();
        }
    }

    fn process_dmrs(&self) {
        let start = Instant::now();
        {
            let mut dmrs = self.dmrs_pool.acquire();
            process_dmrs(self.grid.as_ref(), &mut dmrs, &self.pdu);
        }
        trace!("process_dmrs: {:?}", start.elapsed());
        self.finish_task();
    }

    fn process_ptrs(&self) {
        let start = Instant::now();
        {
            let mut ptrs = self.ptrs_pool.acquire();
            process_ptrs(self.grid.as_ref(), &mut ptrs, &self.pdu);
        }
        trace!("process_ptrs: {:?}", start.elapsed());
        self.finish_task();
    }

    /// Process codeblocks until none is left to claim
    fn process_cb_batch(&self) {
        let nof_cb = self.segmentation.nof_codeblocks();
        {
            let mut cb_processor = self.cb_pool.acquire();

            loop {
                let claimed = self.cb_counter.fetch_add(1, Ordering::Relaxed);
                if claimed >= nof_cb {
                    break;
                }
                let start = Instant::now();

                // The last codeblock also computes the TB CRC, start with it
                let index = nof_cb - 1 - claimed;
                let config = self.segmentation.codeblock_config(index, self.c_init);
                let symbols = cb_processor.process(self.data.buffer(), &config);
                self.mapper.map(
                    self.grid.as_ref(),
                    symbols,
                    &self.allocation,
                    &self.reserved,
                    &self.precoding,
                    config.specific.re_offset,
                );

                let label = if index == nof_cb - 1 { "Last CB" } else { "CB" };
                trace!("{} {}: {:?}", label, index, start.elapsed());
            }
        }

        if self.cb_task_counter.decrement_and_check_zero() {
            self.data.release();
            self.finish_task();
        }
    }
}

/// PDSCH processor fanning work out to a task executor
///
/// Only one transmission may be in flight per instance. Pools may be shared
/// between instances.
pub struct PdschProcessorConcurrent {
    cb_pool: Arc<ProcessorPool<PdschCodeblockProcessor>>,
    dmrs_pool: Arc<ProcessorPool<DmrsPdschProcessor>>,
    ptrs_pool: Arc<ProcessorPool<PtrsPdschGenerator>>,
    mapper: Arc<dyn ResourceGridMapper>,
    executor: Arc<dyn TaskExecutor>,
    validator: PdschPduValidator,
    busy: Arc<AtomicBool>,
}

impl PdschProcessorConcurrent {
    pub fn new(
        cb_pool: Arc<ProcessorPool<PdschCodeblockProcessor>>,
        dmrs_pool: Arc<ProcessorPool<DmrsPdschProcessor>>,
        ptrs_pool: Arc<ProcessorPool<PtrsPdschGenerator>>,
        mapper: Arc<dyn ResourceGridMapper>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            cb_pool,
            dmrs_pool,
            ptrs_pool,
            mapper,
            executor,
            validator: PdschPduValidator::new(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a transmission is still in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Derive the transmission parameters
    fn save_inputs(
        &self,
        grid: Arc<dyn ResourceGridWriter>,
        notifier: Arc<dyn PdschProcessorNotifier>,
        data: Vec<SharedTransportBlock>,
        pdu: &PdschPdu,
    ) -> ProcessContext {
        let mut blocks = data.into_iter();
        let data = match (blocks.next(), blocks.next()) {
            (Some(tb), None) => tb,
            _ => panic!("Expected exactly one transport block"),
        };
        assert!(!data.is_empty(), "Empty transport block");

        let nof_layers = pdu.nof_layers();
        let allocation = allocation_pattern(pdu);
        let reserved = reserved_pattern(pdu);
        let nof_re = count_data_re(&allocation, &reserved);
        let codeword = pdu.codewords[0];

        let segmentation = PdschSegmentation::derive(
            data.len() * 8,
            pdu.ldpc_base_graph,
            codeword.modulation,
            codeword.rv,
            pdu.tbs_lbrm_bytes,
            nof_re,
            nof_layers,
        );

        let nof_ptrs_tasks = usize::from(pdu.ptrs.is_some());
        let nof_cb_tasks = self.cb_pool.capacity().min(segmentation.nof_codeblocks());

        debug!(
            "PDSCH rnti=0x{:04x} slot={}: TBS={} bytes, {} layers, {} REs, {} codeblocks in {} batches",
            pdu.rnti,
            pdu.slot,
            data.len(),
            nof_layers,
            nof_re,
            segmentation.nof_codeblocks(),
            nof_cb_tasks
        );

        ProcessContext {
            grid,
            notifier,
            data,
            pdu: pdu.clone(),
            c_init: scrambling_c_init(pdu.rnti, 0, pdu.n_id),
            segmentation,
            allocation,
            reserved,
            precoding: data_precoding(pdu),
            async_task_counter: AtomicCounter::new(2 + nof_ptrs_tasks),
            cb_task_counter: AtomicCounter::new(nof_cb_tasks),
            cb_counter: AtomicUsize::new(0),
            cb_pool: self.cb_pool.clone(),
            dmrs_pool: self.dmrs_pool.clone(),
            ptrs_pool: self.ptrs_pool.clone(),
            mapper: self.mapper.clone(),
            busy: self.busy.clone(),
        }
    }

    fn fork_cb_batches(&self, context: &Arc<ProcessContext>) {
        let nof_cb_tasks = context.cb_task_counter.get();

        for _ in 0..nof_cb_tasks {
            let accepted = nof_cb_tasks > 1 && {
                let context = context.clone();
                self.executor.execute(Box::new(move || context.process_cb_batch()))
            };
            if !accepted {
                context.process_cb_batch();
            }
        }
    }
}

impl PdschProcessor for PdschProcessorConcurrent {
    fn process(
        &mut self,
        grid: Arc<dyn ResourceGridWriter>,
        notifier: Arc<dyn PdschProcessorNotifier>,
        data: Vec<SharedTransportBlock>,
        pdu: &PdschPdu,
    ) {
        let was_busy = self.busy.swap(true, Ordering::AcqRel);
        debug_assert!(!was_busy, "PDSCH processor re-entered before the previous transmission finished");

        if let Err(err) = self.validator.is_valid(pdu) {
            panic!("Invalid PDSCH PDU: {}", err);
        }

        let context = Arc::new(self.save_inputs(grid, notifier, data, pdu));

        if pdu.ptrs.is_some() {
            let accepted = self.cb_pool.capacity() > 1 && {
                let context = context.clone();
                self.executor.execute(Box::new(move || context.process_ptrs()))
            };
            if !accepted {
                context.process_ptrs();
            }
        }

        let accepted = {
            let context = context.clone();
            self.executor.execute(Box::new(move || context.process_dmrs()))
        };
        if !accepted {
            context.process_dmrs();
        }

        self.fork_cb_batches(&context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::dmrs::dmrs_sequence_value;
    use crate::phy::pdsch::generic::PdschProcessorGeneric;
    use crate::phy::pdsch::helpers::dmrs_config;
    use crate::phy::pdsch::test_utils::{base_pdu, multi_codeblock_pdu, random_transport_block, CountingNotifier};
    use crate::phy::re_pattern::RbAllocation;
    use crate::phy::resource_grid::ResourceGrid;
    use crate::phy::resource_grid_mapper::DefaultResourceGridMapper;
    use bytes::Bytes;
    use common::{LdpcBaseGraph, ModulationScheme};
    use interfaces::{InlineExecutor, Task, WorkerPoolConfig, WorkerPoolExecutor};
    use ndarray::Array3;
    use num_complex::Complex32;
    use std::sync::Mutex;

    fn worker_pool(nof_threads: usize) -> Arc<dyn TaskExecutor> {
        Arc::new(
            WorkerPoolExecutor::new(WorkerPoolConfig {
                name: "pdsch_test".to_string(),
                nof_threads,
                queue_size: 64,
            })
            .unwrap(),
        )
    }

    fn concurrent(capacity: usize, executor: Arc<dyn TaskExecutor>, mapper: Arc<dyn ResourceGridMapper>) -> PdschProcessorConcurrent {
        PdschProcessorConcurrent::new(
            Arc::new(ProcessorPool::new(capacity, PdschCodeblockProcessor::new)),
            Arc::new(ProcessorPool::new(1, DmrsPdschProcessor::new)),
            Arc::new(ProcessorPool::new(1, PtrsPdschGenerator::new)),
            mapper,
            executor,
        )
    }

    /// Transport block counting its releases
    fn counted_tb(data: Bytes, releases: &Arc<AtomicUsize>) -> SharedTransportBlock {
        let releases = releases.clone();
        SharedTransportBlock::with_release_hook(data, move || {
            releases.fetch_add(1, Ordering::AcqRel);
        })
    }

    /// Run one transmission to completion and return the grid
    fn run(processor: &mut dyn PdschProcessor, pdu: &PdschPdu, data: &Bytes, nof_ports: usize) -> Array3<Complex32> {
        let grid = Arc::new(ResourceGrid::new(nof_ports, pdu.bwp_start_rb + pdu.bwp_size_rb));
        let notifier = Arc::new(CountingNotifier::default());
        let releases = Arc::new(AtomicUsize::new(0));

        processor.process(grid.clone(), notifier.clone(), vec![counted_tb(data.clone(), &releases)], pdu);
        notifier.wait();

        assert_eq!(notifier.count(), 1);
        assert_eq!(releases.load(Ordering::Acquire), 1);
        grid.snapshot()
    }

    fn reference(pdu: &PdschPdu, data: &Bytes, nof_ports: usize) -> Array3<Complex32> {
        let mut generic = PdschProcessorGeneric::new(Arc::new(DefaultResourceGridMapper::new()));
        run(&mut generic, pdu, data, nof_ports)
    }

    /// Executor accepting every task and running it only when asked
    #[derive(Default)]
    struct DeferredExecutor {
        tasks: Mutex<Vec<Task>>,
    }

    impl DeferredExecutor {
        fn run_all(&self) -> usize {
            let tasks: Vec<Task> = std::mem::take(&mut *self.tasks.lock().unwrap());
            let nof_tasks = tasks.len();
            tasks.into_iter().for_each(|task| task());
            nof_tasks
        }
    }

    impl TaskExecutor for DeferredExecutor {
        fn execute(&self, task: Task) -> bool {
            self.tasks.lock().unwrap().push(task);
            true
        }
    }

    /// Mapper recording the RE offset of every call
    struct RecordingMapper {
        offsets: Mutex<Vec<usize>>,
    }

    impl ResourceGridMapper for RecordingMapper {
        fn map(
            &self,
            grid: &dyn ResourceGridWriter,
            symbols: &[Complex32],
            allocation: &RePattern,
            reserved: &RePatternList,
            precoding: &PrecodingMatrix,
            re_skip: usize,
        ) -> usize {
            self.offsets.lock().unwrap().push(re_skip);
            DefaultResourceGridMapper.map(grid, symbols, allocation, reserved, precoding, re_skip)
        }
    }

    #[test]
    fn test_matches_generic_for_any_worker_count() {
        let pdu = multi_codeblock_pdu(100);
        let data = random_transport_block(7, 6000);
        let expected = reference(&pdu, &data, 2);

        for (capacity, nof_threads) in [(1, 1), (2, 2), (4, 4), (8, 3)] {
            let mut processor = concurrent(capacity, worker_pool(nof_threads), Arc::new(DefaultResourceGridMapper::new()));
            for _ in 0..3 {
                let grid = run(&mut processor, &pdu, &data, 2);
                assert_eq!(grid, expected, "capacity={} threads={}", capacity, nof_threads);
            }
        }
    }

    #[test]
    fn test_inline_fallback_matches_async() {
        let pdu = multi_codeblock_pdu(52);
        let data = random_transport_block(11, 3000);

        let mut asynchronous = concurrent(4, worker_pool(4), Arc::new(DefaultResourceGridMapper::new()));
        let expected = run(&mut asynchronous, &pdu, &data, 2);

        let mut inline = concurrent(4, Arc::new(InlineExecutor), Arc::new(DefaultResourceGridMapper::new()));
        let grid = Arc::new(ResourceGrid::new(2, 52));
        let notifier = Arc::new(CountingNotifier::default());
        inline.process(grid.clone(), notifier.clone(), vec![SharedTransportBlock::new(data.clone())], &pdu);

        // Everything ran on this thread
        assert_eq!(notifier.count(), 1);
        assert!(!inline.is_busy());
        assert_eq!(grid.snapshot(), expected);
    }

    #[test]
    fn test_single_completion_and_release() {
        let executor = worker_pool(4);
        let mut processor = concurrent(3, executor, Arc::new(DefaultResourceGridMapper::new()));

        for (i, nof_bytes) in [1usize, 40, 500, 2000, 5000, 9000].iter().enumerate() {
            let mut pdu = multi_codeblock_pdu(100);
            if i % 2 == 0 {
                pdu.ptrs = None;
            }
            let data = random_transport_block(i as u64, *nof_bytes);
            for _ in 0..5 {
                run(&mut processor, &pdu, &data, 2);
            }
        }
    }

    #[test]
    fn test_notifies_after_last_task() {
        let executor = Arc::new(DeferredExecutor::default());
        let mut processor = concurrent(4, executor.clone(), Arc::new(DefaultResourceGridMapper::new()));

        let pdu = multi_codeblock_pdu(100);
        let grid = Arc::new(ResourceGrid::new(2, 100));
        let notifier = Arc::new(CountingNotifier::default());
        let releases = Arc::new(AtomicUsize::new(0));
        processor.process(
            grid,
            notifier.clone(),
            vec![counted_tb(random_transport_block(3, 6000), &releases)],
            &pdu,
        );

        // PT-RS, DM-RS and four batches wait in the executor
        assert_eq!(notifier.count(), 0);
        assert_eq!(releases.load(Ordering::Acquire), 0);
        assert!(processor.is_busy());

        assert_eq!(executor.run_all(), 6);
        assert_eq!(notifier.count(), 1);
        assert_eq!(releases.load(Ordering::Acquire), 1);
        assert!(!processor.is_busy());
    }

    #[test]
    fn test_single_batch_runs_inline() {
        // One codeblock: the batch is never offered, the DM-RS is deferred
        let executor = Arc::new(DeferredExecutor::default());
        let mut processor = concurrent(4, executor.clone(), Arc::new(DefaultResourceGridMapper::new()));
        let notifier = Arc::new(CountingNotifier::default());
        let releases = Arc::new(AtomicUsize::new(0));

        processor.process(
            Arc::new(ResourceGrid::new(1, 10)),
            notifier.clone(),
            vec![counted_tb(random_transport_block(4, 100), &releases)],
            &base_pdu(10),
        );

        assert_eq!(releases.load(Ordering::Acquire), 1);
        assert_eq!(notifier.count(), 0);
        assert_eq!(executor.run_all(), 1);
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn test_codeblocks_claimed_last_first() {
        let mapper = Arc::new(RecordingMapper { offsets: Mutex::new(Vec::new()) });
        let mut processor = concurrent(1, Arc::new(InlineExecutor), mapper.clone());

        let pdu = multi_codeblock_pdu(100);
        let data = random_transport_block(5, 6000);
        run(&mut processor, &pdu, &data, 2);

        let nof_re = count_data_re(&allocation_pattern(&pdu), &reserved_pattern(&pdu));
        let segmentation = PdschSegmentation::derive(48_000, pdu.ldpc_base_graph, pdu.codewords[0].modulation, 1, pdu.tbs_lbrm_bytes, nof_re, 2);
        let expected: Vec<usize> = segmentation.codeblocks.iter().rev().map(|cb| cb.re_offset).collect();

        assert!(expected.len() > 1);
        assert_eq!(*mapper.offsets.lock().unwrap(), expected);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "re-entered")]
    fn test_reentry_is_detected() {
        let executor = Arc::new(DeferredExecutor::default());
        let mut processor = concurrent(2, executor, Arc::new(DefaultResourceGridMapper::new()));
        let pdu = base_pdu(10);

        for seed in 0..2 {
            processor.process(
                Arc::new(ResourceGrid::new(1, 10)),
                Arc::new(CountingNotifier::default()),
                vec![SharedTransportBlock::new(random_transport_block(seed, 100))],
                &pdu,
            );
        }
    }

    /// Single layer QPSK on BG2 over 100 PRB without PT-RS
    /// Quadrant of an RE: 0 when silent, else 1 + (re < 0) + 2 (im < 0)
    fn quadrant(value: Complex32) -> u64 {
        if value == Complex32::new(0.0, 0.0) {
            0
        } else {
            1 + (value.re < 0.0) as u64 + 2 * (value.im < 0.0) as u64
        }
    }

    #[test]
    fn test_fixed_scenario() {
        let mut pdu = base_pdu(100);
        pdu.freq_alloc = RbAllocation::Contiguous { start: 0, len: 100 };
        pdu.rnti = 0x1234;
        pdu.n_id = 500;
        pdu.scrambling_id = 500;
        pdu.slot = 0;
        let data: Bytes = (0..1500u32).map(|i| (i * 7 + 3) as u8).collect::<Vec<u8>>().into();

        // 12000 bits over BG2: four codeblocks of 3300 REs lifted by Z=320
        let seg = PdschSegmentation::derive(12_000, LdpcBaseGraph::BaseGraph2, ModulationScheme::Qpsk, 0, 0, 13_200, 1);
        assert_eq!((seg.nof_codeblocks(), seg.common.lifting_size), (4, 320));
        assert!(seg.codeblocks.iter().all(|cb| cb.rm_length_re == 3300));

        let mut processor = concurrent(4, worker_pool(2), Arc::new(DefaultResourceGridMapper::new()));
        let grid = run(&mut processor, &pdu, &data, 1);
        assert_eq!(grid, reference(&pdu, &data, 1));

        // Data REs are unit energy QPSK points
        let amplitude = std::f32::consts::FRAC_1_SQRT_2;
        for symbol in (3..14).chain(std::iter::once(2)) {
            for k in 0..1200 {
                let value = grid[(0, symbol, k)];
                if symbol == 2 && k % 2 == 1 {
                    // CDM group 1 is reserved and silent
                    assert_eq!(value, Complex32::new(0.0, 0.0));
                    continue;
                }
                assert!((value.re.abs() - amplitude).abs() < 1e-6, "symbol {} k {}", symbol, k);
                assert!((value.im.abs() - amplitude).abs() < 1e-6, "symbol {} k {}", symbol, k);
            }
        }

        // DMRS follows the sequence from the reference point
        let dmrs = dmrs_config(&pdu);
        for (m, k) in [(0usize, 0usize), (1, 2), (599, 1198)] {
            let expected = dmrs_sequence_value(0, 2, 500, false, m, dmrs.amplitude);
            assert_eq!(grid[(0, 2, k)], expected);
        }

        // Symbols 0 and 1 are outside the allocation
        assert!((0..1200).all(|k| grid[(0, 0, k)] == Complex32::new(0.0, 0.0)));
        assert!((0..1200).all(|k| grid[(0, 1, k)] == Complex32::new(0.0, 0.0)));

        // Recorded quadrants: first RE of every codeblock, DMRS and grid edges
        let recorded: [((usize, usize), u64); 15] = [
            ((3, 0), 3),
            ((3, 1), 3),
            ((3, 2), 4),
            ((3, 3), 1),
            ((3, 1199), 2),
            ((5, 600), 3),
            ((5, 900), 3),
            ((8, 123), 2),
            ((8, 600), 4),
            ((11, 300), 1),
            ((13, 1198), 3),
            ((13, 1199), 1),
            ((2, 0), 2),
            ((2, 2), 1),
            ((2, 1198), 1),
        ];
        for ((symbol, k), expected) in recorded {
            assert_eq!(quadrant(grid[(0, symbol, k)]), expected, "symbol {} k {}", symbol, k);
        }

        let first: Vec<u64> = (0..16).map(|k| quadrant(grid[(0, 3, k)])).collect();
        assert_eq!(first, vec![3, 3, 4, 1, 1, 4, 2, 1, 1, 3, 3, 4, 3, 4, 2, 2]);
        let last: Vec<u64> = (1184..1200).map(|k| quadrant(grid[(0, 13, k)])).collect();
        assert_eq!(last, vec![4, 1, 3, 3, 1, 4, 1, 2, 2, 4, 4, 2, 2, 4, 3, 1]);

        // Whole grid, symbol by symbol
        let checksum = (0..14)
            .flat_map(|symbol| (0..1200).map(move |k| (symbol, k)))
            .fold(0u64, |acc, (symbol, k)| {
                acc.wrapping_mul(31).wrapping_add(quadrant(grid[(0, symbol, k)]))
            });
        assert_eq!(checksum, 0xf66f_7e66_8284_7d9f);
    }
}
