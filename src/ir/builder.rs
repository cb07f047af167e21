//! Fluent construction of programs and method bodies.
//!
//! Hosts (and this crate's own tests and benches) assemble the program model
//! through [`ProgramBuilder`] and [`BodyBuilder`]. All structural validation
//! happens once, in [`ProgramBuilder::finish`]: register bounds, branch
//! targets, parameter lists, and symbol references are checked there so the
//! analysis can index without re-validating.

use std::collections::HashMap;

use crate::{
    ir::{
        BasicBlock, BlockId, Class, ClassId, Field, FieldFlags, FieldId, Instr, Intrinsic, Method,
        MethodBody, MethodFlags, MethodId, Program, Reg, Terminator, ValueType,
    },
    Error, Result,
};

/// Builds one method body block by block.
///
/// Blocks are created with [`block`](Self::block), filled with
/// [`push`](Self::push), and sealed with [`terminate`](Self::terminate).
/// The first created block is the entry block.
#[derive(Debug)]
pub struct BodyBuilder {
    reg_count: u16,
    param_regs: Vec<Reg>,
    blocks: Vec<(Vec<Instr>, Option<Terminator>)>,
}

impl BodyBuilder {
    /// Creates a body builder with the given register file size and
    /// parameter registers (including the receiver for instance methods).
    #[must_use]
    pub fn new(reg_count: u16, param_regs: Vec<Reg>) -> Self {
        Self {
            reg_count,
            param_regs,
            blocks: Vec::new(),
        }
    }

    /// Creates a new, empty basic block and returns its id.
    pub fn block(&mut self) -> BlockId {
        let id = BlockId::new(u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        self.blocks.push((Vec::new(), None));
        id
    }

    /// Appends an instruction to a block.
    pub fn push(&mut self, block: BlockId, instr: Instr) -> &mut Self {
        if let Some((instrs, _)) = self.blocks.get_mut(block.index()) {
            instrs.push(instr);
        }
        self
    }

    /// Seals a block with its terminator.
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) -> &mut Self {
        if let Some((_, slot)) = self.blocks.get_mut(block.index()) {
            *slot = Some(terminator);
        }
        self
    }

    /// Finishes the body. The entry block is the first created block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCfg`] if the body has no blocks or any block
    /// was left unterminated.
    pub fn finish(self) -> Result<MethodBody> {
        if self.blocks.is_empty() {
            return Err(Error::InvalidCfg("method body has no blocks".into()));
        }
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (index, (instrs, terminator)) in self.blocks.into_iter().enumerate() {
            let Some(terminator) = terminator else {
                return Err(Error::InvalidCfg(format!(
                    "block B{index} has no terminator"
                )));
            };
            blocks.push(BasicBlock::new(instrs, terminator));
        }
        Ok(MethodBody::new(
            blocks,
            BlockId::new(0),
            self.reg_count,
            self.param_regs,
        ))
    }
}

/// Builds the whole-program symbol index.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    classes: Vec<Class>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    bodies: HashMap<usize, MethodBody>,
}

impl ProgramBuilder {
    /// Creates an empty program builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a class and returns its id.
    pub fn add_class(&mut self, name: &str) -> ClassId {
        let id = ClassId::new(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));
        self.classes.push(Class {
            name: name.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
        });
        id
    }

    /// Declares a field on a class and returns its id.
    pub fn add_field(
        &mut self,
        class: ClassId,
        name: &str,
        ty: ValueType,
        flags: FieldFlags,
    ) -> FieldId {
        let id = FieldId::new(u32::try_from(self.fields.len()).unwrap_or(u32::MAX));
        self.fields.push(Field {
            name: name.to_string(),
            class,
            ty,
            flags,
        });
        if let Some(c) = self.classes.get_mut(class.index()) {
            c.fields.push(id);
        }
        id
    }

    /// Declares a method on a class and returns its id.
    ///
    /// `param_count` includes the receiver for instance methods. The body is
    /// attached separately with [`set_body`](Self::set_body); methods left
    /// body-less are treated as external.
    pub fn declare_method(
        &mut self,
        class: ClassId,
        name: &str,
        flags: MethodFlags,
        param_count: u16,
    ) -> MethodId {
        let id = MethodId::new(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        self.methods.push(Method {
            name: name.to_string(),
            class,
            flags,
            param_count,
            body: None,
            intrinsic: None,
        });
        if let Some(c) = self.classes.get_mut(class.index()) {
            c.methods.push(id);
        }
        id
    }

    /// Declares an external method with a precise intrinsic model.
    pub fn add_intrinsic(
        &mut self,
        class: ClassId,
        name: &str,
        param_count: u16,
        intrinsic: Intrinsic,
    ) -> MethodId {
        let id = self.declare_method(class, name, MethodFlags::STATIC, param_count);
        if let Some(m) = self.methods.get_mut(id.index()) {
            m.intrinsic = Some(intrinsic);
        }
        id
    }

    /// Attaches a body to a previously declared method.
    pub fn set_body(&mut self, method: MethodId, body: MethodBody) -> &mut Self {
        self.bodies.insert(method.index(), body);
        self
    }

    /// Validates and finishes the program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCfg`] when a body references registers beyond
    /// its declared register count, branches to a nonexistent block, or its
    /// parameter registers disagree with the declared parameter count;
    /// returns the matching `Unknown*` error when an instruction references a
    /// symbol outside the tables.
    pub fn finish(mut self) -> Result<Program> {
        for (index, body) in self.bodies.drain() {
            let Some(method) = self.methods.get_mut(index) else {
                return Err(Error::UnknownMethod(MethodId::new(
                    u32::try_from(index).unwrap_or(u32::MAX),
                )));
            };
            if method.intrinsic.is_some() {
                return Err(Error::InvalidCfg(format!(
                    "intrinsic method {} cannot carry a body",
                    method.name
                )));
            }
            method.body = Some(body);
        }

        let program = Program {
            classes: self.classes,
            fields: self.fields,
            methods: self.methods,
        };
        for (id, method) in program.methods() {
            if let Some(body) = &method.body {
                Self::validate_body(&program, id, method.param_count, body)?;
            }
        }
        Ok(program)
    }

    fn validate_body(
        program: &Program,
        method: MethodId,
        param_count: u16,
        body: &MethodBody,
    ) -> Result<()> {
        let name = program.qualified_method_name(method);
        if body.param_regs().len() != param_count as usize {
            return Err(Error::InvalidCfg(format!(
                "{name}: {} parameter registers for {param_count} declared parameters",
                body.param_regs().len()
            )));
        }

        let check_reg = |reg: Reg| -> Result<()> {
            if reg.index() >= body.reg_count() as usize {
                return Err(Error::InvalidCfg(format!(
                    "{name}: register {reg} out of range (reg_count {})",
                    body.reg_count()
                )));
            }
            Ok(())
        };
        let check_target = |target: BlockId| -> Result<()> {
            if target.index() >= body.block_count() {
                return Err(Error::InvalidCfg(format!(
                    "{name}: branch target {target} out of range ({} blocks)",
                    body.block_count()
                )));
            }
            Ok(())
        };

        for reg in body.param_regs() {
            check_reg(*reg)?;
        }

        for (_, block) in body.iter_blocks() {
            for instr in block.instrs() {
                if let Some(dest) = instr.dest() {
                    check_reg(dest)?;
                }
                match instr {
                    Instr::Move { src, .. } => check_reg(*src)?,
                    Instr::BinOp { lhs, rhs, .. } => {
                        check_reg(*lhs)?;
                        check_reg(*rhs)?;
                    }
                    Instr::IGet { object, field, .. } => {
                        check_reg(*object)?;
                        program.field(*field)?;
                    }
                    Instr::IPut { src, object, field } => {
                        check_reg(*src)?;
                        check_reg(*object)?;
                        program.field(*field)?;
                    }
                    Instr::SGet { field, .. } => {
                        program.field(*field)?;
                    }
                    Instr::SPut { src, field } => {
                        check_reg(*src)?;
                        program.field(*field)?;
                    }
                    Instr::NewInstance { class, .. } => {
                        program.class(*class)?;
                    }
                    Instr::InvokeStatic { method, args, .. } => {
                        program.method(*method)?;
                        for arg in args {
                            check_reg(*arg)?;
                        }
                    }
                    Instr::InvokeDirect { method, this, args }
                    | Instr::InvokeVirtual {
                        method, this, args, ..
                    } => {
                        program.method(*method)?;
                        check_reg(*this)?;
                        for arg in args {
                            check_reg(*arg)?;
                        }
                    }
                    Instr::Const { .. } | Instr::LoadCachedBox { .. } => {}
                }
            }
            match block.terminator() {
                Terminator::Goto { target } => check_target(*target)?,
                Terminator::Branch {
                    lhs,
                    rhs,
                    then_target,
                    else_target,
                    ..
                } => {
                    check_reg(*lhs)?;
                    check_reg(*rhs)?;
                    check_target(*then_target)?;
                    check_target(*else_target)?;
                }
                Terminator::Return { value } => {
                    if let Some(reg) = value {
                        check_reg(*reg)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unterminated_block_rejected() {
        let mut body = BodyBuilder::new(1, vec![]);
        let b0 = body.block();
        body.push(
            b0,
            Instr::Const {
                dest: Reg::new(0),
                value: 1,
            },
        );
        assert!(matches!(body.finish(), Err(Error::InvalidCfg(_))));
    }

    #[test]
    fn test_register_out_of_range_rejected() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("A");
        let method = builder.declare_method(class, "m", MethodFlags::STATIC, 0);

        let mut body = BodyBuilder::new(1, vec![]);
        let b0 = body.block();
        body.push(
            b0,
            Instr::Const {
                dest: Reg::new(5),
                value: 1,
            },
        )
        .terminate(b0, Terminator::Return { value: None });
        builder.set_body(method, body.finish().unwrap());

        assert!(matches!(builder.finish(), Err(Error::InvalidCfg(_))));
    }

    #[test]
    fn test_param_reg_mismatch_rejected() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("A");
        let method = builder.declare_method(class, "m", MethodFlags::STATIC, 2);

        let mut body = BodyBuilder::new(1, vec![Reg::new(0)]);
        let b0 = body.block();
        body.terminate(b0, Terminator::Return { value: None });
        builder.set_body(method, body.finish().unwrap());

        assert!(matches!(builder.finish(), Err(Error::InvalidCfg(_))));
    }

    #[test]
    fn test_valid_program_builds() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("A");
        let field = builder.add_field(class, "x", ValueType::Int, FieldFlags::STATIC);
        let method = builder.declare_method(class, "m", MethodFlags::STATIC, 0);

        let mut body = BodyBuilder::new(1, vec![]);
        let b0 = body.block();
        body.push(
            b0,
            Instr::SGet {
                dest: Reg::new(0),
                field,
            },
        )
        .terminate(
            b0,
            Terminator::Return {
                value: Some(Reg::new(0)),
            },
        );
        builder.set_body(method, body.finish().unwrap());

        let program = builder.finish().unwrap();
        assert_eq!(program.field_count(), 1);
        assert!(program.method(method).unwrap().body.is_some());
        assert_eq!(program.qualified_method_name(method), "A.m");
    }
}
