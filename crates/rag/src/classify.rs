//! Rule-based query classification.

use crate::forms::{extract_forms, extract_years};
use crate::types::{Classification, QueryType, RetrievalWeights};
use chrono::Datelike;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Confidence reported when no rule matches.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

const REGISTERED_ACCOUNT_CONFIDENCE: f32 = 0.9;
const FORM_OVERRIDE_BELOW: f32 = 0.8;
const FORM_OVERRIDE_CONFIDENCE: f32 = 0.85;

macro_rules! rule_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

rule_pattern!(
    RE_SKIP,
    r"(?i)^\s*(?:hi|hello|hey|hiya|yo|good\s+(?:morning|afternoon|evening)|thanks?|thank\s+you|thx|ty|ok(?:ay)?|cool|great|awesome|got\s+it|bye|goodbye|yes|no|sure|perfect)(?:\s+(?:there|so\s+much|you|again|a\s+lot))?\s*[!.?]*\s*$"
);

rule_pattern!(
    RE_FORM_LOOKUP,
    r"(?i)\b(?:which|what)\s+(?:tax\s+)?(?:form|slip|schedule)s?\b|\bform\s+[a-z]{0,4}\d|\b(?:line|box)\s+\d{2,5}\b|\bschedule\s+\d+\b|\bwhere\s+(?:do|can)\s+i\s+(?:find|get|download)\b"
);

rule_pattern!(
    RE_CALCULATION,
    r"(?i)\bhow\s+much\b|\bcalculat\w*|\bcompute\b|\bestimate\b|\bwhat\s+(?:is|are|will\s+be)\s+my\s+(?:tax|taxes|refund|balance)\b|\bpercent(?:age)?\b|\btax\s+rates?\b|\bbrackets?\b"
);

rule_pattern!(
    RE_DEADLINE,
    r"(?i)\bdeadlines?\b|\bdue\s+dates?\b|\bwhen\b.*\b(?:due|file|filed|pay|paid|submit)\b|\bby\s+when\b|\blast\s+day\b|\bhow\s+late\b|\blate[\s\-]filing\b"
);

rule_pattern!(
    RE_ELIGIBILITY,
    r"(?i)\beligib\w*|\bqualif\w*|\b(?:can|may)\s+i\s+(?:claim|deduct|contribute|apply|get)\b|\bam\s+i\s+(?:allowed|entitled)\b|\bentitled\s+to\b"
);

rule_pattern!(
    RE_DEFINITION,
    r"(?i)^\s*what\s+(?:is|are)\s+(?:a|an|the)?\s*[\w\-]+(?:\s+[\w\-]+)?\s*\??\s*$|\bdefin(?:e|ition)\b|\bmeaning\s+of\b|\bwhat\s+does\s+.+\s+mean\b"
);

rule_pattern!(
    RE_PROCEDURE,
    r"(?i)\bhow\s+(?:do|can|should)\s+(?:i|we)\b|\bhow\s+to\b|\bsteps?\s+(?:to|for)\b|\bapply\s+for\b|\bregister\s+for\b|\bprocess\s+(?:to|for)\b"
);

rule_pattern!(
    RE_COMPARISON,
    r"(?i)\bvs\.?\b|\bversus\b|\bdifference\s+between\b|\bcompar(?:e|ed|ing|ison)\b|\bbetter\b.*\bor\b|\b(?:rrsp|tfsa|fhsa|resp)\b.*\bor\b.*\b(?:rrsp|tfsa|fhsa|resp)\b"
);

rule_pattern!(
    RE_REGISTERED_ACCOUNT_LIMIT,
    r"(?i)\b(?:room|limits?|maximum|max|ceiling|carry[\s\-]?forward)\b.*\b(?:rrsp|tfsa|fhsa|resp|rdsp|prpp)s?\b|\b(?:rrsp|tfsa|fhsa|resp|rdsp|prpp)s?\b.*\b(?:room|limits?|maximum|max|ceiling|carry[\s\-]?forward)\b|\bhow\s+much\s+(?:can|may|should)\s+(?:i|we)\s+(?:contribute|put)\b.*\b(?:rrsp|tfsa|fhsa|resp|rdsp|prpp)s?\b"
);

struct Rule {
    query_type: QueryType,
    pattern: &'static LazyLock<Option<Regex>>,
    confidence: f32,
}

/// Declaration order breaks ties.
static RULES: &[Rule] = &[
    Rule {
        query_type: QueryType::FormLookup,
        pattern: &RE_FORM_LOOKUP,
        confidence: 0.8,
    },
    Rule {
        query_type: QueryType::Calculation,
        pattern: &RE_CALCULATION,
        confidence: 0.75,
    },
    Rule {
        query_type: QueryType::Deadline,
        pattern: &RE_DEADLINE,
        confidence: 0.85,
    },
    Rule {
        query_type: QueryType::Eligibility,
        pattern: &RE_ELIGIBILITY,
        confidence: 0.8,
    },
    Rule {
        query_type: QueryType::Definition,
        pattern: &RE_DEFINITION,
        confidence: 0.7,
    },
    Rule {
        query_type: QueryType::Procedure,
        pattern: &RE_PROCEDURE,
        confidence: 0.75,
    },
    Rule {
        query_type: QueryType::Comparison,
        pattern: &RE_COMPARISON,
        confidence: 0.8,
    },
];

/// Retrieval strategy per query type.
pub fn weights_for(query_type: QueryType) -> RetrievalWeights {
    match query_type {
        QueryType::Definition => RetrievalWeights::new(0.7),
        QueryType::Deadline | QueryType::FormLookup => RetrievalWeights::new(0.4),
        QueryType::Calculation => RetrievalWeights::new(0.5),
        QueryType::Eligibility
        | QueryType::Procedure
        | QueryType::Comparison
        | QueryType::General => RetrievalWeights::default(),
    }
}

fn matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

#[derive(Debug, Clone)]
pub struct QueryClassifier {
    current_year: i32,
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClassifier {
    pub fn new() -> Self {
        Self {
            current_year: chrono::Local::now().year(),
        }
    }

    /// Pin the year window, for reproducible results.
    pub fn with_current_year(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn classify(&self, text: &str) -> Classification {
        if matches(&RE_SKIP, text) {
            return Classification {
                query_type: QueryType::General,
                confidence: DEFAULT_CONFIDENCE,
                forms: BTreeSet::new(),
                years: BTreeSet::new(),
                weights: RetrievalWeights::default(),
                skip_retrieval: true,
            };
        }

        let forms = extract_forms(text);
        let years = extract_years(text, self.current_year);

        let mut query_type = QueryType::General;
        let mut confidence = DEFAULT_CONFIDENCE;
        for rule in RULES {
            if rule.confidence > confidence && matches(rule.pattern, text) {
                query_type = rule.query_type;
                confidence = rule.confidence;
            }
        }

        if matches(&RE_REGISTERED_ACCOUNT_LIMIT, text) {
            query_type = QueryType::Eligibility;
            confidence = REGISTERED_ACCOUNT_CONFIDENCE;
        }

        if !forms.is_empty() && confidence < FORM_OVERRIDE_BELOW {
            query_type = QueryType::FormLookup;
            confidence = FORM_OVERRIDE_CONFIDENCE;
        }

        let weights = if forms.is_empty() {
            weights_for(query_type)
        } else {
            RetrievalWeights::new(0.5)
        };

        tracing::debug!(
            "Classified query as {} (confidence {:.2}, forms {:?}, years {:?})",
            query_type.as_str(),
            confidence,
            forms,
            years
        );

        Classification {
            query_type,
            confidence,
            forms,
            years,
            weights,
            skip_retrieval: false,
        }
    }
}
