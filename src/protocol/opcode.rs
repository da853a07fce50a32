/// @see https://www.mongodb.com/docs/manual/legacy-opcodes/
pub const OP_REPLY: i32 = 1;
pub const OP_UPDATE: i32 = 2001;
pub const OP_INSERT: i32 = 2002;
pub const OP_QUERY: i32 = 2004;
pub const OP_GET_MORE: i32 = 2005;
pub const OP_DELETE: i32 = 2006;
pub const OP_KILL_CURSORS: i32 = 2007;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpCode {
    Reply = OP_REPLY,
    Update = OP_UPDATE,
    Insert = OP_INSERT,
    //    RESERVED = 2003
    Query = OP_QUERY,
    GetMore = OP_GET_MORE,
    Delete = OP_DELETE,
    KillCursors = OP_KILL_CURSORS,
}

impl From<OpCode> for i32 {
    fn from(value: OpCode) -> Self {
        value as i32
    }
}

impl TryFrom<i32> for OpCode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            OP_REPLY => Ok(OpCode::Reply),
            OP_UPDATE => Ok(OpCode::Update),
            OP_INSERT => Ok(OpCode::Insert),
            OP_QUERY => Ok(OpCode::Query),
            OP_GET_MORE => Ok(OpCode::GetMore),
            OP_DELETE => Ok(OpCode::Delete),
            OP_KILL_CURSORS => Ok(OpCode::KillCursors),
            unknown => Err(unknown),
        }
    }
}
