/// PDSCH processor factory
///
/// Owns the processor pools shared by every concurrent processor it creates.
/// Size the codeblock pool for the number of codeblock tasks that may run at
/// once across all of them.

use super::codeblock_processor::PdschCodeblockProcessor;
use super::concurrent::PdschProcessorConcurrent;
use super::generic::PdschProcessorGeneric;
use super::validator::PdschPduValidator;
use crate::phy::dmrs::DmrsPdschProcessor;
use crate::phy::ptrs::PtrsPdschGenerator;
use crate::phy::resource_grid_mapper::ResourceGridMapper;
use crate::LayerError;
use common::ProcessorPool;
use interfaces::TaskExecutor;
use std::sync::Arc;
use tracing::info;

pub struct PdschProcessorFactory {
    cb_pool: Arc<ProcessorPool<PdschCodeblockProcessor>>,
    dmrs_pool: Arc<ProcessorPool<DmrsPdschProcessor>>,
    ptrs_pool: Arc<ProcessorPool<PtrsPdschGenerator>>,
    executor: Arc<dyn TaskExecutor>,
    mapper: Arc<dyn ResourceGridMapper>,
}

impl PdschProcessorFactory {
    /// Build the shared pools
    ///
    /// `cb_pool_capacity` bounds the number of codeblock batches of one
    /// transmission. The DM-RS and PT-RS pools get the same capacity, enough
    /// for one task of each per concurrent transmission.
    pub fn new(
        cb_pool_capacity: usize,
        executor: Arc<dyn TaskExecutor>,
        mapper: Arc<dyn ResourceGridMapper>,
    ) -> Result<Self, LayerError> {
        if cb_pool_capacity == 0 {
            return Err(LayerError::InvalidConfiguration(
                "Codeblock processor pool capacity must be non-zero".to_string(),
            ));
        }

        info!("Creating PDSCH processor pools with {} codeblock processors", cb_pool_capacity);

        Ok(Self {
            cb_pool: Arc::new(ProcessorPool::new(cb_pool_capacity, PdschCodeblockProcessor::new)),
            dmrs_pool: Arc::new(ProcessorPool::new(cb_pool_capacity, DmrsPdschProcessor::new)),
            ptrs_pool: Arc::new(ProcessorPool::new(cb_pool_capacity, PtrsPdschGenerator::new)),
            executor,
            mapper,
        })
    }

    pub fn cb_pool_capacity(&self) -> usize {
        self.cb_pool.capacity()
    }

    pub fn create_concurrent(&self) -> PdschProcessorConcurrent {
        PdschProcessorConcurrent::new(
            self.cb_pool.clone(),
            self.dmrs_pool.clone(),
            self.ptrs_pool.clone(),
            self.mapper.clone(),
            self.executor.clone(),
        )
    }

    /// Sequential processor sharing the factory mapper
    pub fn create_generic(&self) -> PdschProcessorGeneric {
        PdschProcessorGeneric::new(self.mapper.clone())
    }

    pub fn create_validator(&self) -> PdschPduValidator {
        PdschPduValidator::new()
    }
}
