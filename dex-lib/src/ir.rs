use itertools::Itertools;

use crate::lexer::{Identifier, IdentifierTable};

/// Name of a branch target. Identity is the interned name, the graph
/// keeps the mapping to the block the label marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub Identifier);

/// Name of a try region connecting its markers and catch handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TryId(pub Identifier);

#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierType {
    Local,
    Method,
    Label,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    /// Instruction without control flow. The opcode semantics belong
    /// to the upstream decoder and the analyses; here the mnemonic
    /// and the operands are opaque.
    Op {
        mnemonic: Identifier,
        args: Vec<Identifier>,
    },
    Goto {
        target: Label,
    },
    /// Conditional branch, falls through when not taken.
    Branch {
        cond: Identifier,
        target: Label,
    },
    /// One taken target per case, the default falls through.
    Switch {
        scrutinee: Identifier,
        cases: Vec<Label>,
    },
    Return {
        value: Option<Identifier>,
    },
    Throw {
        value: Option<Identifier>,
    },
}

impl Inst {
    /// Whether the instruction always ends a basic block.
    pub fn is_terminator(&self) -> bool {
        !matches!(self, Inst::Op { .. })
    }

    /// The labels the instruction may transfer control to, in case
    /// order for switches.
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Inst::Goto { target } | Inst::Branch { target, .. } => vec![*target],
            Inst::Switch { cases, .. } => cases.clone(),
            _ => Vec::new(),
        }
    }
}

/// An element of the linear representation of a method's code: an
/// instruction, or one of the markers structuring the stream. The
/// markers describing branch targets and try regions are consumed
/// when a control flow graph takes ownership of the stream; catch,
/// debug and position entries travel with their block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    Inst(Inst),
    /// The position branches referring to the label jump to.
    Target(Label),
    TryStart(TryId),
    TryEnd(TryId),
    /// First entry of a catch handler of the region. The handlers of
    /// a region form a chain in declaration order.
    Catch(TryId),
    /// Opaque debug payload.
    Debug(Identifier),
    /// Source line number.
    Position(u32),
}

impl Entry {
    pub fn as_inst(&self) -> Option<&Inst> {
        match self {
            Entry::Inst(inst) => Some(inst),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: Identifier,
    pub entries: Vec<Entry>,
}

#[derive(Clone, Debug, Default)]
pub struct Unit {
    pub methods: Vec<Method>,
    pub identifiers: IdentifierTable,
}

pub fn print_inst(inst: &Inst, unit: &Unit) -> String {
    let name = |id: Identifier| unit.identifiers.get_name(id);
    match inst {
        Inst::Op { mnemonic, args } if args.is_empty() => format!("{};", name(*mnemonic)),
        Inst::Op { mnemonic, args } => format!(
            "{} {};",
            name(*mnemonic),
            args.iter().map(|&arg| name(arg)).join(" ")
        ),
        Inst::Goto { target } => format!("goto {};", name(target.0)),
        Inst::Branch { cond, target } => format!("if {} {};", name(*cond), name(target.0)),
        Inst::Switch { scrutinee, cases } => format!(
            "switch {} {};",
            name(*scrutinee),
            cases.iter().map(|case| name(case.0)).join(" ")
        ),
        Inst::Return { value: Some(value) } => format!("return {};", name(*value)),
        Inst::Return { value: None } => "return;".to_owned(),
        Inst::Throw { value: Some(value) } => format!("throw {};", name(*value)),
        Inst::Throw { value: None } => "throw;".to_owned(),
    }
}

pub fn print_entry(entry: &Entry, unit: &Unit) -> String {
    let name = |id: Identifier| unit.identifiers.get_name(id);
    match entry {
        Entry::Inst(inst) => print_inst(inst, unit),
        Entry::Target(label) => format!("{}:", name(label.0)),
        Entry::TryStart(region) => format!(".try_start {};", name(region.0)),
        Entry::TryEnd(region) => format!(".try_end {};", name(region.0)),
        Entry::Catch(region) => format!(".catch {};", name(region.0)),
        Entry::Debug(info) => format!(".debug {};", name(*info)),
        Entry::Position(line) => format!(".pos {line};"),
    }
}

pub fn print_method(method: &Method, unit: &Unit) -> String {
    let mut result = format!("{} {{\n", unit.identifiers.get_name(method.name));
    for entry in &method.entries {
        // Labels are flush with the margin, everything else indented.
        if !matches!(entry, Entry::Target(_)) {
            result.push_str("  ");
        }
        result.push_str(&print_entry(entry, unit));
        result.push('\n');
    }
    result.push('}');
    result
}

pub fn print(unit: &Unit) -> String {
    if unit.methods.is_empty() {
        return String::new();
    }
    unit.methods
        .iter()
        .map(|method| print_method(method, unit))
        .join("\n\n")
        + "\n"
}
