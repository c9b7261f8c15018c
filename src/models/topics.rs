/// 随机选题种子
use phf::phf_map;
use rand::seq::SliceRandom;
use rand::Rng;

/// 研究领域 → 候选主题
static TOPICS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "computer science" => &[
        "lock-free data structures for persistent memory",
        "energy-aware scheduling in heterogeneous clusters",
        "verifiable compilation of smart contracts",
        "robustness of retrieval-augmented language models",
    ],
    "mathematics" => &[
        "spectral bounds for sparse random graphs",
        "numerical stability of mixed-precision solvers",
        "combinatorial designs in error-correcting codes",
    ],
    "physics" => &[
        "noise mitigation in superconducting qubits",
        "thermal transport in two-dimensional materials",
        "machine-learned interatomic potentials",
    ],
    "biology" => &[
        "protein structure prediction for orphan families",
        "microbiome dynamics under antibiotic pressure",
        "single-cell lineage tracing methods",
    ],
    "economics" => &[
        "algorithmic pricing and tacit collusion",
        "labor market effects of remote work",
        "central bank digital currency adoption",
    ],
    "environmental science" => &[
        "urban heat island mitigation with green roofs",
        "satellite monitoring of methane emissions",
        "microplastic transport in river systems",
    ],
};

/// 选题种子：领域 + 主题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSeed {
    pub field: &'static str,
    pub topic: &'static str,
}

impl TopicSeed {
    /// 发布时使用的关键词
    pub fn keywords(&self) -> Vec<String> {
        vec![self.field.to_string(), self.topic.to_string()]
    }
}

pub fn pick_random_topic() -> TopicSeed {
    pick_topic(&mut rand::thread_rng())
}

pub fn pick_topic<R: Rng + ?Sized>(rng: &mut R) -> TopicSeed {
    let mut fields: Vec<&'static str> = TOPICS.keys().copied().collect();
    fields.sort_unstable();
    let field = fields.choose(rng).copied().unwrap_or("computer science");
    let topic = TOPICS
        .get(field)
        .and_then(|topics| topics.choose(rng).copied())
        .unwrap_or("open problems in distributed systems");
    TopicSeed { field, topic }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_topic_belongs_to_field() {
        for _ in 0..20 {
            let seed = pick_random_topic();
            let topics = TOPICS.get(seed.field).unwrap();
            assert!(topics.contains(&seed.topic));
            assert_eq!(seed.keywords().len(), 2);
        }
    }
}
