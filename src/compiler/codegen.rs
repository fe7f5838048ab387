use crate::{
    parse_tree::{NodeKind, ParseTree},
    parser::MAX_NESTING,
};

use super::{
    bytecode::{Instruction, Opcode, Opr, Sio},
    environment::{Binding, ProcedureHandle, Resolved, SymbolTable},
    CompileOptions, SemanticError,
};

// Every nesting level the parser allows takes at most three generator calls
// (expression, term, factor), so parsed trees always fit.
const MAX_DEPTH: usize = 4 * MAX_NESTING;

/// Generates the instructions for a whole program tree.
///
/// Nothing is returned unless every node generated successfully.
pub fn generate(
    tree: &ParseTree,
    options: &CompileOptions,
) -> Result<Vec<Instruction>, SemanticError> {
    Generator::new(options).generate(tree)
}

/// Single pass, depth first walk over a parse tree.
///
/// The next free code address is always the length of the instruction buffer,
/// so forward jumps are emitted as placeholders and patched by index once the
/// address they need exists.
#[derive(Debug)]
pub struct Generator {
    symbols: SymbolTable,
    code: Vec<Instruction>,
    // live statement and expression calls
    depth: usize,
}

fn level(resolved: &Resolved) -> u32 {
    u32::try_from(resolved.level_difference).unwrap_or(u32::MAX)
}

// identifier or number text of a terminal node
fn terminal<'t>(
    node: &'t ParseTree,
    kind: NodeKind,
    expected: &'static str,
) -> Result<&'t str, SemanticError> {
    match node.text() {
        Some(text) if node.kind() == kind => Ok(text),
        _ => Err(SemanticError::malformed(expected, node.describe())),
    }
}

fn number(node: &ParseTree) -> Result<i64, SemanticError> {
    let text = terminal(node, NodeKind::Number, "a number")?;
    text.parse()
        .map_err(|_| SemanticError::NumberOutOfRange(text.into()))
}

impl Generator {
    pub fn new(options: &CompileOptions) -> Self {
        Self {
            symbols: SymbolTable::new(options.frame_base),
            code: vec![],
            depth: 0,
        }
    }

    /// Consumes the generator, returning the program's code.
    pub fn generate(mut self, tree: &ParseTree) -> Result<Vec<Instruction>, SemanticError> {
        match tree.kind() {
            NodeKind::Program => {
                let [block] = tree.children() else {
                    return Err(SemanticError::malformed("a single block", tree.describe()));
                };
                self.block(block, None)?;
            }
            NodeKind::Block => self.block(tree, None)?,
            _ => return Err(SemanticError::malformed("a program", tree.describe())),
        }
        tracing::debug!(instructions = self.code.len(), "generated program");
        Ok(self.code)
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, instruction: Instruction) {
        tracing::trace!(address = self.here(), %instruction, "emit");
        self.code.push(instruction);
    }

    /// Emits a jump whose target is filled in later by [`Self::patch`].
    fn placeholder(&mut self, opcode: Opcode) -> usize {
        let address = self.here();
        self.emit(Instruction::new(opcode, 0, 0));
        address
    }

    /// Points the placeholder at `address` to the next free address.
    fn patch(&mut self, address: usize) {
        let target = self.here();
        if let Some(jump) = self.code.get_mut(address) {
            tracing::trace!(address, target, "backpatch {}", jump.opcode);
            jump.modifier = target as i64;
        }
    }

    fn block(
        &mut self,
        block: &ParseTree,
        procedure: Option<ProcedureHandle>,
    ) -> Result<(), SemanticError> {
        if block.kind() != NodeKind::Block {
            return Err(SemanticError::malformed("a block", block.describe()));
        }
        // the program block uses the table's own outermost scope
        if procedure.is_none() {
            return self.block_contents(block, None);
        }
        self.symbols.enter_scope();
        let result = self.block_contents(block, procedure);
        self.symbols.leave_scope();
        result
    }

    fn block_contents(
        &mut self,
        block: &ParseTree,
        procedure: Option<ProcedureHandle>,
    ) -> Result<(), SemanticError> {
        if let Some(handle) = procedure {
            self.symbols.fix_procedure(handle, self.here());
        }

        let mut skip_procedures = None;
        let mut body = None;
        for child in block.children() {
            if body.is_some() {
                return Err(SemanticError::malformed("the end of the block", child.describe()));
            }
            match child.kind() {
                NodeKind::ConstDeclaration => self.const_declaration(child)?,
                NodeKind::VarDeclaration => self.var_declaration(child)?,
                NodeKind::ProcedureDeclaration => {
                    if skip_procedures.is_none() {
                        skip_procedures = Some(self.placeholder(Opcode::Jmp));
                    }
                    self.procedure_declaration(child)?;
                }
                _ => body = Some(child),
            }
        }
        if let Some(jump) = skip_procedures {
            self.patch(jump);
        }

        let frame_size = self.symbols.frame_size();
        if frame_size > 0 {
            self.emit(Instruction::new(Opcode::Inc, 0, frame_size));
        }
        let body = body.ok_or_else(|| SemanticError::missing("a statement", NodeKind::Block))?;
        self.statement(body)?;
        self.emit(Instruction::opr(Opr::Return));
        Ok(())
    }

    fn const_declaration(&mut self, declaration: &ParseTree) -> Result<(), SemanticError> {
        for constant in declaration.children() {
            let [name, value] = constant.children() else {
                return Err(SemanticError::malformed("a constant", constant.describe()));
            };
            if constant.kind() != NodeKind::Constant {
                return Err(SemanticError::malformed("a constant", constant.describe()));
            }
            let name = terminal(name, NodeKind::Identifier, "an identifier")?;
            let value = number(value)?;
            self.symbols.declare_constant(name, value)?;
        }
        Ok(())
    }

    // flat and right-nested identifier lists both work
    fn var_declaration(&mut self, declaration: &ParseTree) -> Result<(), SemanticError> {
        let mut pending: Vec<_> = declaration.children().iter().rev().collect();
        while let Some(node) = pending.pop() {
            if node.kind() == NodeKind::Identifiers {
                pending.extend(node.children().iter().rev());
            } else {
                let name = terminal(node, NodeKind::Identifier, "an identifier")?;
                self.symbols.declare_variable(name)?;
            }
        }
        Ok(())
    }

    fn procedure_declaration(&mut self, declaration: &ParseTree) -> Result<(), SemanticError> {
        let [name, body] = declaration.children() else {
            return Err(SemanticError::malformed(
                "a procedure name and block",
                declaration.describe(),
            ));
        };
        let name = terminal(name, NodeKind::Identifier, "an identifier")?;
        let handle = self.symbols.declare_procedure(name)?;
        tracing::debug!(
            procedure = name,
            level = self.symbols.depth() + 1,
            entry = self.here(),
            "generating procedure"
        );
        self.block(body, Some(handle))
    }

    /// Runs `generate` on `node` one nesting level deeper, failing instead of
    /// exhausting the stack on absurdly deep trees.
    fn nested(
        &mut self,
        node: &ParseTree,
        generate: fn(&mut Self, &ParseTree) -> Result<(), SemanticError>,
    ) -> Result<(), SemanticError> {
        if self.depth >= MAX_DEPTH {
            return Err(SemanticError::TooDeep(node.kind()));
        }
        self.depth += 1;
        let result = generate(self, node);
        self.depth -= 1;
        result
    }

    fn statement(&mut self, statement: &ParseTree) -> Result<(), SemanticError> {
        self.nested(statement, Self::statement_kind)
    }

    fn statement_kind(&mut self, statement: &ParseTree) -> Result<(), SemanticError> {
        let children = statement.children();
        match statement.kind() {
            NodeKind::Statement => match children {
                [] => Ok(()),
                [inner] => self.statement(inner),
                [_, extra, ..] => Err(SemanticError::malformed("one statement", extra.describe())),
            },
            // statement lists are flattened rather than recursed into
            NodeKind::Statements | NodeKind::BeginBlock => {
                let mut pending: Vec<_> = children.iter().rev().collect();
                while let Some(child) = pending.pop() {
                    if child.kind() == NodeKind::Statements {
                        pending.extend(child.children().iter().rev());
                    } else {
                        self.statement(child)?;
                    }
                }
                Ok(())
            }
            NodeKind::Assignment => {
                let [target, value] = children else {
                    return Err(SemanticError::malformed(
                        "a target and an expression",
                        statement.describe(),
                    ));
                };
                self.expression(value)?;
                self.store(target)
            }
            NodeKind::ReadStatement => {
                let [target] = children else {
                    return Err(SemanticError::malformed("a read target", statement.describe()));
                };
                self.emit(Instruction::sio(Sio::Read));
                self.store(target)
            }
            NodeKind::WriteStatement => {
                let [value] = children else {
                    return Err(SemanticError::malformed("one expression", statement.describe()));
                };
                self.expression(value)?;
                self.emit(Instruction::sio(Sio::Write));
                Ok(())
            }
            NodeKind::IfStatement => {
                let [condition, body] = children else {
                    return Err(SemanticError::malformed(
                        "a condition and a statement",
                        statement.describe(),
                    ));
                };
                self.condition(condition)?;
                let skip = self.placeholder(Opcode::Jpc);
                self.statement(body)?;
                self.patch(skip);
                Ok(())
            }
            NodeKind::WhileStatement => {
                let [condition, body] = children else {
                    return Err(SemanticError::malformed(
                        "a condition and a statement",
                        statement.describe(),
                    ));
                };
                let start = self.here();
                self.condition(condition)?;
                let exit = self.placeholder(Opcode::Jpc);
                self.statement(body)?;
                self.emit(Instruction::new(Opcode::Jmp, 0, start as i64));
                self.patch(exit);
                Ok(())
            }
            NodeKind::CallStatement => {
                let [target] = children else {
                    return Err(SemanticError::malformed("a procedure name", statement.describe()));
                };
                self.call(target)
            }
            _ => Err(SemanticError::malformed("a statement", statement.describe())),
        }
    }

    fn store(&mut self, target: &ParseTree) -> Result<(), SemanticError> {
        let name = terminal(target, NodeKind::Identifier, "an identifier")?;
        let resolved = self.symbols.resolve(name)?;
        match resolved.binding {
            Binding::Variable { address } => {
                self.emit(Instruction::new(Opcode::Sto, level(&resolved), address));
                Ok(())
            }
            binding => Err(SemanticError::NotAssignable {
                name: name.into(),
                kind: binding.describe(),
            }),
        }
    }

    fn call(&mut self, target: &ParseTree) -> Result<(), SemanticError> {
        let name = terminal(target, NodeKind::Identifier, "an identifier")?;
        let resolved = self.symbols.resolve(name)?;
        match resolved.binding {
            Binding::Procedure { entry } => {
                self.emit(Instruction::new(Opcode::Cal, level(&resolved), entry as i64));
                Ok(())
            }
            binding => Err(SemanticError::NotCallable {
                name: name.into(),
                kind: binding.describe(),
            }),
        }
    }

    fn condition(&mut self, condition: &ParseTree) -> Result<(), SemanticError> {
        if condition.kind() != NodeKind::Condition {
            return Err(SemanticError::malformed("a condition", condition.describe()));
        }
        match condition.children() {
            [odd, operand] if odd.kind() == NodeKind::Odd => {
                self.expression(operand)?;
                self.emit(Instruction::opr(Opr::Odd));
            }
            [lhs, op, rhs] => {
                let relation = terminal(op, NodeKind::RelOp, "a relational operator")
                    .ok()
                    .and_then(Opr::relation)
                    .ok_or_else(|| {
                        SemanticError::malformed("a relational operator", op.describe())
                    })?;
                self.expression(lhs)?;
                self.expression(rhs)?;
                self.emit(Instruction::opr(relation));
            }
            _ => return Err(SemanticError::malformed("a condition", condition.describe())),
        }
        Ok(())
    }

    /// Anything that leaves one value on the stack: an expression, term or
    /// factor, or a bare identifier or number.
    fn expression(&mut self, node: &ParseTree) -> Result<(), SemanticError> {
        self.nested(node, Self::value)
    }

    fn value(&mut self, node: &ParseTree) -> Result<(), SemanticError> {
        match node.kind() {
            NodeKind::Expression => {
                let mut children = node.children().iter().peekable();
                let negate = match children.next_if(|child| child.kind() == NodeKind::AddOp) {
                    None => false,
                    Some(sign) => match sign.text() {
                        Some("+") => false,
                        Some("-") => true,
                        _ => return Err(SemanticError::malformed("a sign", sign.describe())),
                    },
                };
                let first = children
                    .next()
                    .ok_or_else(|| SemanticError::missing("a term", NodeKind::Expression))?;
                self.expression(first)?;
                if negate {
                    self.emit(Instruction::opr(Opr::Negate));
                }
                self.operations(children, NodeKind::AddOp, NodeKind::Expression)
            }
            NodeKind::Term => {
                let mut children = node.children().iter();
                let first = children
                    .next()
                    .ok_or_else(|| SemanticError::missing("a factor", NodeKind::Term))?;
                self.expression(first)?;
                self.operations(children, NodeKind::MulOp, NodeKind::Term)
            }
            NodeKind::Factor => match node.children() {
                [inner] => self.expression(inner),
                _ => Err(SemanticError::malformed("one operand", node.describe())),
            },
            NodeKind::Number => {
                let value = number(node)?;
                self.emit(Instruction::lit(value));
                Ok(())
            }
            NodeKind::Identifier => self.load(node),
            _ => Err(SemanticError::malformed("an expression", node.describe())),
        }
    }

    // `(op operand)*` tails of expressions and terms
    fn operations<'t>(
        &mut self,
        mut rest: impl Iterator<Item = &'t ParseTree>,
        operator: NodeKind,
        parent: NodeKind,
    ) -> Result<(), SemanticError> {
        while let Some(op) = rest.next() {
            let opr = match op.text() {
                Some(text) if op.kind() == operator => Opr::arithmetic(text),
                _ => None,
            }
            .ok_or_else(|| SemanticError::malformed("an arithmetic operator", op.describe()))?;
            let operand = rest
                .next()
                .ok_or_else(|| SemanticError::missing("an operand", parent))?;
            self.expression(operand)?;
            self.emit(Instruction::opr(opr));
        }
        Ok(())
    }

    fn load(&mut self, identifier: &ParseTree) -> Result<(), SemanticError> {
        let name = terminal(identifier, NodeKind::Identifier, "an identifier")?;
        let resolved = self.symbols.resolve(name)?;
        match resolved.binding {
            Binding::Constant { value } => self.emit(Instruction::lit(value)),
            Binding::Variable { address } => {
                self.emit(Instruction::new(Opcode::Lod, level(&resolved), address))
            }
            Binding::Procedure { .. } => return Err(SemanticError::NotAnExpression(name.into())),
        }
        Ok(())
    }
}
