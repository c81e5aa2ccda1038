//! Just enough of the JVM class file format to find a class's methods.

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

impl Method {
    pub fn is_public_static(&self) -> bool {
        self.access_flags & (ACC_PUBLIC | ACC_STATIC) == ACC_PUBLIC | ACC_STATIC
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Internal (slash separated) name, e.g. `winstone/Launcher`.
    pub this_class: String,
    pub methods: Vec<Method>,
}

impl ClassFile {
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed class file at byte {offset}: {reason}")]
pub struct ClassFormatError {
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class(u16),
    Other,
    // Second slot of a long or double.
    Unusable,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn error(&self, reason: impl Into<String>) -> ClassFormatError {
        ClassFormatError {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error("unexpected end of data"))?;
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.bytes(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

pub fn parse(data: &[u8]) -> Result<ClassFile, ClassFormatError> {
    let mut cur = Cursor { data, pos: 0 };

    if cur.u32()? != MAGIC {
        return Err(ClassFormatError {
            offset: 0,
            reason: "bad magic number".to_string(),
        });
    }
    cur.skip(4)?; // minor, major

    let pool = read_constant_pool(&mut cur)?;

    let _access_flags = cur.u16()?;
    let this_index = cur.u16()?;
    let this_class = match pool.get(usize::from(this_index)) {
        Some(Constant::Class(name_index)) => utf8(&pool, *name_index, &cur)?,
        _ => return Err(cur.error(format!("this_class #{} is not a class constant", this_index))),
    };
    cur.skip(2)?; // super_class

    let interfaces = usize::from(cur.u16()?);
    cur.skip(interfaces * 2)?;

    // Fields and methods share the same layout; fields are only skipped.
    let fields = cur.u16()?;
    for _ in 0..fields {
        cur.skip(6)?;
        skip_attributes(&mut cur)?;
    }

    let method_count = cur.u16()?;
    let mut methods = Vec::with_capacity(usize::from(method_count));
    for _ in 0..method_count {
        let access_flags = cur.u16()?;
        let name_index = cur.u16()?;
        let descriptor_index = cur.u16()?;
        skip_attributes(&mut cur)?;
        methods.push(Method {
            name: utf8(&pool, name_index, &cur)?,
            descriptor: utf8(&pool, descriptor_index, &cur)?,
            access_flags,
        });
    }

    Ok(ClassFile { this_class, methods })
}

fn read_constant_pool(cur: &mut Cursor<'_>) -> Result<Vec<Constant>, ClassFormatError> {
    let count = usize::from(cur.u16()?);
    // Index 0 is unused.
    let mut pool = vec![Constant::Unusable];

    while pool.len() < count {
        let tag = cur.u8()?;
        match tag {
            1 => {
                let len = usize::from(cur.u16()?);
                let bytes = cur.bytes(len)?;
                pool.push(Constant::Utf8(String::from_utf8_lossy(bytes).into_owned()));
            }
            7 => pool.push(Constant::Class(cur.u16()?)),
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                cur.skip(4)?;
                pool.push(Constant::Other);
            }
            5 | 6 => {
                cur.skip(8)?;
                pool.push(Constant::Other);
                pool.push(Constant::Unusable);
            }
            8 | 16 | 19 | 20 => {
                cur.skip(2)?;
                pool.push(Constant::Other);
            }
            15 => {
                cur.skip(3)?;
                pool.push(Constant::Other);
            }
            other => return Err(cur.error(format!("unknown constant pool tag {}", other))),
        }
    }

    Ok(pool)
}

fn skip_attributes(cur: &mut Cursor<'_>) -> Result<(), ClassFormatError> {
    let count = cur.u16()?;
    for _ in 0..count {
        cur.skip(2)?;
        let len = cur.u32()? as usize;
        cur.skip(len)?;
    }
    Ok(())
}

fn utf8(pool: &[Constant], index: u16, cur: &Cursor<'_>) -> Result<String, ClassFormatError> {
    match pool.get(usize::from(index)) {
        Some(Constant::Utf8(value)) => Ok(value.clone()),
        _ => Err(cur.error(format!("constant #{} is not a UTF-8 constant", index))),
    }
}
