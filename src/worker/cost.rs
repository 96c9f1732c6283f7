//! Cost worker: assigns per-node cost by budget tier (§4.2 "cost" /
//! estimate-cost). Deterministic and table-driven — unlike the population
//! and enrichment workers, a price table does not need an LLM round trip.

use async_trait::async_trait;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::Result;
use crate::model::event::WorkerKind;
use crate::model::itinerary::{BudgetTier, Itinerary};
use crate::model::node::{Cost, CostTier, NodeType};

const TASK_TYPE: &str = "estimate-cost";

/// Base per-node cost estimate in the itinerary's currency, before the
/// budget-tier multiplier, indexed by node type.
fn base_amount(node_type: NodeType) -> f64 {
    match node_type {
        NodeType::Attraction => 20.0,
        NodeType::Meal => 25.0,
        NodeType::Hotel => 120.0,
        NodeType::Transit => 10.0,
        NodeType::Activity => 35.0,
    }
}

fn tier_multiplier(tier: BudgetTier) -> f64 {
    match tier {
        BudgetTier::Economy => 0.6,
        BudgetTier::Mid => 1.0,
        BudgetTier::Luxury => 2.2,
    }
}

fn tier_to_cost_tier(tier: BudgetTier) -> CostTier {
    match tier {
        BudgetTier::Economy => CostTier::Economy,
        BudgetTier::Mid => CostTier::Mid,
        BudgetTier::Luxury => CostTier::Luxury,
    }
}

pub struct CostWorker;

#[async_trait]
impl Worker for CostWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Cost,
            priority: 0,
            chat_enabled: false,
            produces_changeset: false,
        }
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        _request: &WorkerRequest,
        _execution_id: &str,
    ) -> Result<WorkerOutput> {
        let mut populated = itinerary.clone();
        let tier = populated.trip.budget_tier;
        for day in &mut populated.days {
            let day_number = day.day_number;
            for node in &mut day.nodes {
                if node.cost.is_some() {
                    continue;
                }
                let Some(node_type) = node.node_type else {
                    continue;
                };
                let currency = itinerary.effective_currency(day_number, &node.id);
                node.cost = Some(Cost {
                    amount: Some(base_amount(node_type) * tier_multiplier(tier)),
                    currency: Some(currency),
                    per_person: true,
                    tier: Some(tier_to_cost_tier(tier)),
                });
            }
        }
        Ok(WorkerOutput::Populated(populated))
    }
}
