//! The honest participant: build on your head, tell everyone, vote for your
//! head with everything you have.

use forkbribe_engine::{keep_all, BuildBlock, Engine, EngineError, Vote};
use forkbribe_primitives::EntityId;

use crate::hooks::{EventLog, StrategyHooks};

#[derive(Debug, Clone)]
pub struct HonestStrategy {
    pub entity: EntityId,
    pub all_entities: Vec<EntityId>,
    pub base_slot: u64,
    pub chain_len: u64,
}

impl StrategyHooks for HonestStrategy {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn build(&mut self, engine: Engine, _events: &mut EventLog) -> Result<Engine, EngineError> {
        let head = engine.head(self.entity)?;
        let slot = engine.slot().num;
        engine.build_block(
            &BuildBlock::new(slot, head)
                .known_by(&self.all_entities)
                .proposer(self.entity)
                .final_block(slot > self.base_slot + self.chain_len),
            keep_all,
            keep_all,
        )
    }

    fn vote(&mut self, engine: Engine, _events: &mut EventLog) -> Result<Engine, EngineError> {
        let head = engine.head(self.entity)?;
        let vote = Vote {
            entity: self.entity,
            from_slot: engine.slot().num,
            min_index: 0,
            max_index: engine.voting_power(self.entity) - 1,
            to_slot: head,
        };
        engine.add_votes([vote])
    }
}
