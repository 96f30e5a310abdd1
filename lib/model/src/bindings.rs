use oxrdf::{BlankNode, GraphNameRef, Quad, Term, TermRef, Variable};
use spargebra::term::{GraphNamePattern, NamedNodePattern, QuadPattern, TermPattern};
use std::collections::btree_map::Iter;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// A solution mapping from variables to terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bindings {
    values: BTreeMap<Variable, Term>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.values.get(variable)
    }

    /// Binds `variable` to `term`, returning the previously bound term.
    pub fn insert(&mut self, variable: Variable, term: Term) -> Option<Term> {
        self.values.insert(variable, term)
    }

    #[must_use]
    pub fn with(mut self, variable: Variable, term: impl Into<Term>) -> Self {
        self.values.insert(variable, term.into());
        self
    }

    pub fn iter(&self) -> Iter<'_, Variable, Term> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Variable, Term)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (Variable, Term)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Bindings {
    type Item = (&'a Variable, &'a Term);
    type IntoIter = Iter<'a, Variable, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Matches `quad` against `pattern` and returns the resulting bindings.
///
/// Blank nodes in the pattern are not bound, but every occurrence of the same blank node must
/// match the same term. A variable that occurs several times must be bound to the same term at
/// every position. A graph variable only matches named graphs.
pub fn match_quad(pattern: &QuadPattern, quad: &Quad) -> Option<Bindings> {
    let mut matcher = Matcher::default();

    if !matcher.term(&pattern.subject, quad.subject.as_ref().into()) {
        return None;
    }

    let predicate_matches = match &pattern.predicate {
        NamedNodePattern::NamedNode(node) => *node == quad.predicate,
        NamedNodePattern::Variable(variable) => {
            matcher.variable(variable, TermRef::NamedNode(quad.predicate.as_ref()))
        }
    };
    if !predicate_matches {
        return None;
    }

    if !matcher.term(&pattern.object, quad.object.as_ref()) {
        return None;
    }

    let graph_matches = match (&pattern.graph_name, quad.graph_name.as_ref()) {
        (GraphNamePattern::DefaultGraph, graph) => graph.is_default_graph(),
        (GraphNamePattern::NamedNode(node), graph) => graph == GraphNameRef::NamedNode(node.as_ref()),
        (GraphNamePattern::Variable(_), GraphNameRef::DefaultGraph) => false,
        (GraphNamePattern::Variable(variable), GraphNameRef::NamedNode(node)) => {
            matcher.variable(variable, TermRef::NamedNode(node))
        }
        (GraphNamePattern::Variable(variable), GraphNameRef::BlankNode(node)) => {
            matcher.variable(variable, TermRef::BlankNode(node))
        }
    };
    graph_matches.then_some(matcher.bindings)
}

#[derive(Default)]
struct Matcher<'a> {
    bindings: Bindings,
    /// Terms matched by the blank nodes of the pattern. Not part of the solution.
    blank_nodes: HashMap<&'a BlankNode, Term>,
}

impl<'a> Matcher<'a> {
    fn term(&mut self, pattern: &'a TermPattern, term: TermRef<'_>) -> bool {
        match pattern {
            TermPattern::NamedNode(node) => term == TermRef::NamedNode(node.as_ref()),
            TermPattern::Literal(literal) => term == TermRef::Literal(literal.as_ref()),
            TermPattern::BlankNode(node) => match self.blank_nodes.entry(node) {
                Entry::Occupied(matched) => matched.get().as_ref() == term,
                Entry::Vacant(entry) => {
                    entry.insert(term.into_owned());
                    true
                }
            },
            TermPattern::Variable(variable) => self.variable(variable, term),
            #[allow(unreachable_patterns, reason = "Quoted triple patterns depend on a feature")]
            _ => false,
        }
    }

    fn variable(&mut self, variable: &Variable, term: TermRef<'_>) -> bool {
        match self.bindings.get(variable) {
            Some(bound) => bound.as_ref() == term,
            None => {
                self.bindings.insert(variable.clone(), term.into_owned());
                true
            }
        }
    }
}
