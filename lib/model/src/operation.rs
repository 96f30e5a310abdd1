use spargebra::algebra::GraphPattern;
use spargebra::term::{GraphNamePattern, NamedNodePattern, QuadPattern};

/// The operation a source is queried with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryOperation {
    /// A single quad pattern.
    Pattern(QuadPattern),
    /// Any other SPARQL algebra expression.
    Algebra(GraphPattern),
}

impl QueryOperation {
    /// Returns the operation as a single quad pattern, if it is one.
    ///
    /// A basic graph pattern with exactly one triple pattern, optionally wrapped in a `GRAPH`
    /// clause, is a single quad pattern as well.
    pub fn as_quad_pattern(&self) -> Option<QuadPattern> {
        match self {
            QueryOperation::Pattern(pattern) => Some(pattern.clone()),
            QueryOperation::Algebra(pattern) => single_pattern(pattern, GraphNamePattern::DefaultGraph),
        }
    }
}

fn single_pattern(pattern: &GraphPattern, graph_name: GraphNamePattern) -> Option<QuadPattern> {
    match pattern {
        GraphPattern::Bgp { patterns } if patterns.len() == 1 => {
            let triple = &patterns[0];
            Some(QuadPattern {
                subject: triple.subject.clone(),
                predicate: triple.predicate.clone(),
                object: triple.object.clone(),
                graph_name,
            })
        }
        GraphPattern::Graph { name, inner } if graph_name == GraphNamePattern::DefaultGraph => {
            let graph_name = match name {
                NamedNodePattern::NamedNode(node) => GraphNamePattern::NamedNode(node.clone()),
                NamedNodePattern::Variable(variable) => GraphNamePattern::Variable(variable.clone()),
            };
            single_pattern(inner, graph_name)
        }
        _ => None,
    }
}

impl From<QuadPattern> for QueryOperation {
    fn from(pattern: QuadPattern) -> Self {
        QueryOperation::Pattern(pattern)
    }
}

impl From<GraphPattern> for QueryOperation {
    fn from(pattern: GraphPattern) -> Self {
        QueryOperation::Algebra(pattern)
    }
}

/// Describes which operations a source can evaluate by itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorShape {
    /// Single quad patterns.
    Pattern,
    /// Arbitrary algebra expressions, e.g., a SPARQL endpoint.
    Algebra,
    /// Any of the given shapes.
    Disjunction(Vec<SelectorShape>),
}

impl SelectorShape {
    /// Returns whether a source with this shape can evaluate `operation`.
    pub fn accepts(&self, operation: &QueryOperation) -> bool {
        match self {
            SelectorShape::Pattern => operation.as_quad_pattern().is_some(),
            SelectorShape::Algebra => true,
            SelectorShape::Disjunction(shapes) => {
                shapes.iter().any(|shape| shape.accepts(operation))
            }
        }
    }
}
