//! Declaration scanner for GLSL ES 1.00 / GLSL 1.30+ shader sources.
//!
//! Not a compiler: it checks the structural properties a driver rejects
//! first (balanced delimiters, a `main` entry point, known types, qualifiers
//! legal for the stage) and extracts the interface declarations plus whether
//! each is referenced outside its declaration.

use crate::gl::ShaderStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GlslType {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl GlslType {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Declaration {
    pub name: String,
    pub ty: GlslType,
    pub used: bool,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ShaderInterface {
    pub attributes: Vec<Declaration>,
    pub uniforms: Vec<Declaration>,
    /// Varyings read by a fragment stage.
    pub inputs: Vec<Declaration>,
    /// Varyings written by a vertex stage.
    pub outputs: Vec<Declaration>,
    /// `gl_FragColor = vec4(r, g, b, a)` with literal components.
    pub constant_output: Option<[f32; 4]>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    Attribute,
    Uniform,
    Varying,
    In,
    Out,
}

impl Qualifier {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "attribute" => Self::Attribute,
            "uniform" => Self::Uniform,
            "varying" => Self::Varying,
            "in" => Self::In,
            "out" => Self::Out,
            _ => return None,
        })
    }
}

const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];

pub(crate) fn scan(stage: ShaderStage, source: &str) -> Result<ShaderInterface, String> {
    let stripped = strip_comments(source);
    let tokens = tokenize(&stripped);
    check_balanced(&tokens)?;
    if !tokens.windows(3).any(|w| w == ["void", "main", "("]) {
        return Err("0:0: error: missing entry point 'void main()'".to_string());
    }

    let mut interface = ShaderInterface::default();
    for statement in top_level_statements(&tokens) {
        let mut rest = statement;
        if rest.first() == Some(&"layout") {
            rest = skip_layout(rest);
        }
        let Some(qualifier) = rest.first().and_then(|token| Qualifier::parse(token)) else {
            continue;
        };
        rest = &rest[1..];
        if rest.first().is_some_and(|token| PRECISIONS.contains(token)) {
            rest = &rest[1..];
        }
        let Some((type_token, names)) = rest.split_first() else {
            return Err("0:0: error: incomplete declaration".to_string());
        };
        let ty = GlslType::parse(type_token)
            .ok_or_else(|| format!("0:0: error: unknown type '{type_token}'"))?;

        let target = match (stage, qualifier) {
            (ShaderStage::Vertex, Qualifier::Attribute | Qualifier::In) => &mut interface.attributes,
            (ShaderStage::Vertex, Qualifier::Varying | Qualifier::Out) => &mut interface.outputs,
            (ShaderStage::Fragment, Qualifier::Varying | Qualifier::In) => &mut interface.inputs,
            (ShaderStage::Fragment, Qualifier::Attribute) => {
                return Err(
                    "0:0: error: 'attribute' is not allowed in a fragment shader".to_string()
                );
            }
            (ShaderStage::Fragment, Qualifier::Out) => continue,
            (_, Qualifier::Uniform) => &mut interface.uniforms,
        };

        for name in declared_names(names)? {
            let used = tokens.iter().filter(|token| **token == name).count() > 1;
            target.push(Declaration {
                name: name.to_string(),
                ty,
                used,
            });
        }
    }

    if stage == ShaderStage::Fragment {
        interface.constant_output = constant_output(&tokens);
    }
    Ok(interface)
}

fn constant_output(tokens: &[&str]) -> Option<[f32; 4]> {
    tokens.windows(12).find_map(|window| {
        if window[..4] != ["gl_FragColor", "=", "vec4", "("] || window[11] != ")" {
            return None;
        }
        let mut rgba = [0.0; 4];
        for (slot, index) in rgba.iter_mut().zip([4, 6, 8, 10]) {
            if index < 10 && window[index + 1] != "," {
                return None;
            }
            *slot = window[index].parse().ok()?;
        }
        Some(rgba)
    })
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        match (ch, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut last = '\0';
                for next in chars.by_ref() {
                    if last == '*' && next == '/' {
                        break;
                    }
                    last = next;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn tokenize(source: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let mut start = None;
        for (index, ch) in line.char_indices() {
            let word = ch.is_ascii_alphanumeric() || ch == '_' || ch == '.';
            match (word, start) {
                (true, None) => start = Some(index),
                (false, Some(begin)) => {
                    tokens.push(&line[begin..index]);
                    start = None;
                }
                _ => {}
            }
            if !word && !ch.is_whitespace() {
                tokens.push(&line[index..index + ch.len_utf8()]);
            }
        }
        if let Some(begin) = start {
            tokens.push(&line[begin..]);
        }
    }
    // Swizzles and member access (`vec.xy`) reference the base name.
    tokens
        .into_iter()
        .flat_map(|token| {
            if token.starts_with(|ch: char| ch.is_ascii_digit()) {
                vec![token]
            } else {
                token.split('.').filter(|part| !part.is_empty()).collect()
            }
        })
        .collect()
}

fn check_balanced(tokens: &[&str]) -> Result<(), String> {
    let mut stack = Vec::new();
    for token in tokens {
        match *token {
            "(" | "{" | "[" => stack.push(*token),
            ")" | "}" | "]" => {
                let expected = match *token {
                    ")" => "(",
                    "}" => "{",
                    _ => "[",
                };
                if stack.pop() != Some(expected) {
                    return Err(format!("0:0: error: unexpected '{token}'"));
                }
            }
            _ => {}
        }
    }
    match stack.last() {
        Some(open) => Err(format!("0:0: error: unterminated '{open}'")),
        None => Ok(()),
    }
}

/// Statements outside of any `{}` block, split on `;`.
fn top_level_statements<'a>(tokens: &'a [&'a str]) -> Vec<&'a [&'a str]> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        match *token {
            "{" => depth += 1,
            "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    start = index + 1;
                }
            }
            ";" if depth == 0 => {
                statements.push(&tokens[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    statements
}

fn skip_layout<'a>(statement: &'a [&'a str]) -> &'a [&'a str] {
    match statement.iter().position(|token| *token == ")") {
        Some(close) => &statement[close + 1..],
        None => &[],
    }
}

fn declared_names<'a>(tokens: &'a [&'a str]) -> Result<Vec<&'a str>, String> {
    let mut names = Vec::new();
    let mut expect_name = true;
    let mut in_array = false;
    for token in tokens {
        match *token {
            "[" => in_array = true,
            "]" => in_array = false,
            "," if !in_array => expect_name = true,
            _ if in_array => {}
            name if expect_name => {
                if !name.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
                    return Err(format!("0:0: error: invalid identifier '{name}'"));
                }
                names.push(name);
                expect_name = false;
            }
            other => return Err(format!("0:0: error: unexpected '{other}' in declaration")),
        }
    }
    if names.is_empty() {
        return Err("0:0: error: declaration without a name".to_string());
    }
    Ok(names)
}
