//! Chain expression parser and graph builder.
//!
//! ```text
//! # Linear chain: each `|` feeds the previous stage into slot 0
//! noise:scale=8 | levels:gamma=2.2 | output
//!
//! # Parenthesised paths feed slots 1, 2, ...
//! noise | blend(checker:tiles=4):mode=multiply,amount=0.5 | output
//!
//! # Paths nest
//! solid:color=1,0,0,1 | blend(gradient | invert; noise) | output
//! ```
//!
//! ## Grammar
//!
//! ```text
//! chain     ::= segment ( '|' segment )*
//! segment   ::= name ( '(' chain ( ';' chain )* ')' )? ( ':' params )?
//! params    ::= key '=' value ( ',' key '=' value )*
//! ```
//!
//! A comma that is not followed by `key=` belongs to the value, so vector
//! parameters read naturally (`color=1,0,0,1`).
//!
//! Parsing produces a [`ChainSpec`]; [`build_chain`] turns it into a
//! [`StageCollection`] against a [`NodeRegistry`].

use tessel_core::{GraphError, ParamError, ParamValue, StageCollection, StageId};
use tessel_registry::NodeRegistry;

/// One node of a parsed chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Node type name.
    pub name: String,
    /// Paths feeding slots 1, 2, ...
    pub side_inputs: Vec<ChainSpec>,
    /// `key=value` overrides in source order.
    pub params: Vec<(String, String)>,
}

/// A serial chain; element `i` feeds element `i + 1` through slot 0.
pub type ChainSpec = Vec<NodeSpec>;

/// Errors from chain parsing or graph construction.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    /// Empty expression.
    #[error("empty chain expression")]
    Empty,

    /// Unexpected character.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// Byte position.
        pos: usize,
        /// The character found.
        ch: char,
    },

    /// Missing node name.
    #[error("expected a node name at position {pos}")]
    MissingName {
        /// Byte position.
        pos: usize,
    },

    /// Missing `)`.
    #[error("unclosed '(' at position {pos}")]
    Unclosed {
        /// Position of the `(`.
        pos: usize,
    },

    /// Malformed `key=value`.
    #[error("parameter error at position {pos}: {message}")]
    Param {
        /// Byte position.
        pos: usize,
        /// Description.
        message: String,
    },

    /// No node type with this name.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// No parameter with this name on the node.
    #[error("node '{node}' has no parameter '{param}'")]
    UnknownParam {
        /// Node type name.
        node: String,
        /// Parameter name.
        param: String,
    },

    /// Value does not parse for the parameter's type.
    #[error("bad value for {node}.{param}: {source}")]
    BadValue {
        /// Node type name.
        node: String,
        /// Parameter name.
        param: String,
        /// Parse failure.
        #[source]
        source: ParamError,
    },

    /// Wiring rejected by the graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).map(|&b| b as char)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn text(&self, from: usize) -> String {
        String::from_utf8_lossy(&self.input[from..self.pos])
            .trim()
            .to_string()
    }

    fn parse_all(&mut self) -> Result<ChainSpec, DslError> {
        let chain = self.parse_chain()?;
        self.skip_ws();
        match self.peek() {
            Some(ch) => Err(DslError::UnexpectedChar { pos: self.pos, ch }),
            None => Ok(chain),
        }
    }

    /// `chain ::= segment ( '|' segment )*`
    fn parse_chain(&mut self) -> Result<ChainSpec, DslError> {
        let mut nodes = vec![self.parse_segment()?];
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                return Ok(nodes);
            }
            self.advance();
            nodes.push(self.parse_segment()?);
        }
    }

    /// `segment ::= name ( '(' chain ( ';' chain )* ')' )? ( ':' params )?`
    fn parse_segment(&mut self) -> Result<NodeSpec, DslError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.advance();
        }
        let name = self.text(start);
        if name.is_empty() {
            return Err(DslError::MissingName { pos: start });
        }

        let mut side_inputs = Vec::new();
        self.skip_ws();
        if self.peek() == Some('(') {
            let open = self.pos;
            self.advance();
            side_inputs.push(self.parse_chain()?);
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(';') => {
                        self.advance();
                        side_inputs.push(self.parse_chain()?);
                    }
                    Some(')') => {
                        self.advance();
                        break;
                    }
                    _ => return Err(DslError::Unclosed { pos: open }),
                }
            }
        }

        let mut params = Vec::new();
        self.skip_ws();
        if self.peek() == Some(':') {
            self.advance();
            self.parse_params(&mut params)?;
        }

        Ok(NodeSpec {
            name,
            side_inputs,
            params,
        })
    }

    /// `params ::= key '=' value ( ',' key '=' value )*`
    fn parse_params(&mut self, params: &mut Vec<(String, String)>) -> Result<(), DslError> {
        loop {
            self.skip_ws();
            let key_start = self.pos;
            while let Some(ch) = self.peek() {
                if ch == '=' {
                    break;
                }
                if matches!(ch, '|' | ';' | ')' | ',' | '(') {
                    return Err(DslError::Param {
                        pos: key_start,
                        message: format!("expected '=' after '{}'", self.text(key_start)),
                    });
                }
                self.advance();
            }
            if self.peek() != Some('=') {
                return Err(DslError::Param {
                    pos: key_start,
                    message: "expected 'key=value'".to_string(),
                });
            }
            let key = self.text(key_start);
            if key.is_empty() {
                return Err(DslError::Param {
                    pos: key_start,
                    message: "empty parameter name".to_string(),
                });
            }
            self.advance();

            let value_start = self.pos;
            loop {
                match self.peek() {
                    None | Some('|' | ';' | ')') => break,
                    Some(',') if self.next_is_key(self.pos + 1) => break,
                    Some(_) => self.advance(),
                }
            }
            params.push((key, self.text(value_start)));

            if self.peek() == Some(',') {
                self.advance();
            } else {
                return Ok(());
            }
        }
    }

    /// Returns `true` if `from` starts `ident '='`.
    fn next_is_key(&self, from: usize) -> bool {
        let mut p = from;
        while p < self.input.len() && self.input[p].is_ascii_whitespace() {
            p += 1;
        }
        let ident_start = p;
        while p < self.input.len() && (self.input[p].is_ascii_alphanumeric() || self.input[p] == b'_')
        {
            p += 1;
        }
        if p == ident_start || self.input[ident_start].is_ascii_digit() {
            return false;
        }
        while p < self.input.len() && self.input[p].is_ascii_whitespace() {
            p += 1;
        }
        self.input.get(p) == Some(&b'=')
    }
}

/// Parses a chain expression.
pub fn parse_chain(input: &str) -> Result<ChainSpec, DslError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DslError::Empty);
    }
    Parser::new(input).parse_all()
}

/// A chain instantiated as a graph.
#[derive(Debug, Clone)]
pub struct BuiltChain {
    /// The graph.
    pub graph: StageCollection,
    /// Last stage of the top-level chain.
    pub output: StageId,
}

/// Instantiates `spec` with node types from `registry`.
pub fn build_chain(spec: &ChainSpec, registry: &NodeRegistry) -> Result<BuiltChain, DslError> {
    let mut graph = StageCollection::new(registry.catalog());
    let output = build_path(&mut graph, spec, registry)?;
    Ok(BuiltChain { graph, output })
}

fn build_path(
    graph: &mut StageCollection,
    path: &[NodeSpec],
    registry: &NodeRegistry,
) -> Result<StageId, DslError> {
    let mut previous: Option<StageId> = None;
    for node in path {
        let id = build_node(graph, node, registry)?;
        if let Some(prev) = previous {
            graph.connect(id, 0, prev)?;
        }
        previous = Some(id);
    }
    previous.ok_or(DslError::Empty)
}

fn build_node(
    graph: &mut StageCollection,
    node: &NodeSpec,
    registry: &NodeRegistry,
) -> Result<StageId, DslError> {
    let type_id = registry
        .find(&node.name)
        .ok_or_else(|| DslError::UnknownNode(node.name.clone()))?;
    let id = graph.add_stage(type_id)?;

    for (key, value) in &node.params {
        let index = registry
            .param_index_by_name(&node.name, key)
            .ok_or_else(|| DslError::UnknownParam {
                node: node.name.clone(),
                param: key.clone(),
            })?;
        let desc = registry
            .get(&node.name)
            .and_then(|info| info.params.get(index))
            .ok_or_else(|| DslError::UnknownParam {
                node: node.name.clone(),
                param: key.clone(),
            })?;
        let parsed = ParamValue::parse(desc, value).map_err(|source| DslError::BadValue {
            node: node.name.clone(),
            param: key.clone(),
            source,
        })?;
        graph.set_param(id, index, &parsed)?;
    }

    for (i, side) in node.side_inputs.iter().enumerate() {
        let source = build_path(graph, side, registry)?;
        graph.connect(id, i + 1, source)?;
    }
    Ok(id)
}

/// Filename-safe slug of a node name and stage id, used for output files.
pub fn frame_file_name(node: &str, stage: StageId, frame: i32) -> String {
    let node: String = node
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{node}_{}_{frame:04}.png", stage.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(chain: &ChainSpec) -> Vec<&str> {
        chain.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_parse_linear() {
        let chain = parse_chain("noise:scale=8 | levels | output").unwrap();
        assert_eq!(names(&chain), ["noise", "levels", "output"]);
        assert_eq!(chain[0].params, vec![("scale".into(), "8".into())]);
        assert!(chain[1].params.is_empty());
    }

    #[test]
    fn test_parse_vector_values() {
        let chain = parse_chain("solid:color=1, 0,0,1,  label=x").unwrap();
        assert_eq!(
            chain[0].params,
            vec![
                ("color".into(), "1, 0,0,1".into()),
                ("label".into(), "x".into())
            ]
        );
    }

    #[test]
    fn test_parse_side_inputs() {
        let chain = parse_chain("noise | blend(gradient | invert; checker:tiles=2):mode=mix").unwrap();
        assert_eq!(names(&chain), ["noise", "blend"]);
        let blend = &chain[1];
        assert_eq!(blend.side_inputs.len(), 2);
        assert_eq!(names(&blend.side_inputs[0]), ["gradient", "invert"]);
        assert_eq!(blend.side_inputs[1][0].params[0].1, "2");
        assert_eq!(blend.params, vec![("mode".into(), "mix".into())]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_chain("  "), Err(DslError::Empty)));
        assert!(matches!(parse_chain("noise |"), Err(DslError::MissingName { .. })));
        assert!(matches!(parse_chain("blend(noise"), Err(DslError::Unclosed { pos: 5 })));
        assert!(matches!(parse_chain("noise:scale"), Err(DslError::Param { .. })));
        assert!(matches!(
            parse_chain("noise ) x"),
            Err(DslError::UnexpectedChar { ch: ')', .. })
        ));
    }

    #[test]
    fn test_build_wires_slots() {
        let registry = NodeRegistry::new();
        let spec = parse_chain("solid | blend(checker):mode=multiply | output").unwrap();
        let built = build_chain(&spec, &registry).unwrap();
        let g = &built.graph;
        assert_eq!(g.len(), 4);
        let order = g.evaluation_order();
        assert_eq!(order.last(), Some(&built.output));

        let blend = g.effective_inputs(built.output)[0].unwrap();
        let inputs = g.effective_inputs(blend);
        let solid = inputs[0].unwrap();
        let checker = inputs[1].unwrap();
        assert_eq!(g.info(solid).unwrap().name, "solid");
        assert_eq!(g.info(checker).unwrap().name, "checker");
        assert_eq!(g.param(blend, 0).unwrap(), ParamValue::Int(1));
    }

    #[test]
    fn test_build_rejects_unknown_names() {
        let registry = NodeRegistry::new();
        let spec = parse_chain("nope").unwrap();
        assert!(matches!(
            build_chain(&spec, &registry),
            Err(DslError::UnknownNode(n)) if n == "nope"
        ));
        let spec = parse_chain("noise:bogus=1").unwrap();
        assert!(matches!(
            build_chain(&spec, &registry),
            Err(DslError::UnknownParam { .. })
        ));
        let spec = parse_chain("noise:scale=abc").unwrap();
        assert!(matches!(
            build_chain(&spec, &registry),
            Err(DslError::BadValue { .. })
        ));
    }

    #[test]
    fn test_build_rejects_missing_slot() {
        let registry = NodeRegistry::new();
        // Generators have no input slots.
        let spec = parse_chain("noise | checker").unwrap();
        assert!(matches!(build_chain(&spec, &registry), Err(DslError::Graph(_))));
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name("pbr material", StageId(3), 7), "pbr_material_3_0007.png");
    }
}
