//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::tree::expr::{BinaryOp, UnaryOp};

type ParserExtra<'a> = extra::Err<Rich<'a, Token>>;

/// Parse template source code into a syntax tree
pub fn parse(input: &str) -> Result<SourceFile, Vec<crate::ParseError>> {
    let len = input.len();

    let token_iter = crate::parser::lexer::lex(input).map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    file_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// `$ij.x` is injected data; every other `.x` is a field access
fn apply_fields(base: Expr, fields: Vec<String>) -> Expr {
    fields.into_iter().fold(base, |acc, field| match acc {
        Expr::Var(name) if name == "ij" => Expr::Ij(field),
        other => Expr::Field(Box::new(other), field),
    })
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    })
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, ParserExtra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Null => Expr::Null,
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Int(i) => Expr::Int(i),
            Token::Float(f) => Expr::Float(f),
            Token::String(s) => Expr::Str(s),
        };

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let call = select! { Token::Ident(name) => name }
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map_with(|(name, args), e| Expr::Call {
                name,
                args,
                span: span_range(&e.span()),
            });

        let var = select! { Token::Var(name) => Expr::Var(name) };

        let atom = choice((
            literal,
            list,
            call,
            var,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        let postfix = atom
            .then(
                just(Token::Dot)
                    .ignore_then(select! { Token::Ident(field) => field })
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(base, fields)| apply_fields(base, fields));

        let unary = choice((
            just(Token::Not).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
        ))
        .repeated()
        .collect::<Vec<_>>()
        .then(postfix)
        .map(|(ops, operand)| {
            ops.into_iter()
                .rev()
                .fold(operand, |acc, op| Expr::Unary(op, Box::new(acc)))
        })
        .boxed();

        let product = unary
            .clone()
            .then(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                ))
                .then(unary)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let sum = product
            .clone()
            .then(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let comparison = sum
            .clone()
            .then(
                choice((
                    just(Token::LessOrEqual).to(BinaryOp::Le),
                    just(Token::GreaterOrEqual).to(BinaryOp::Ge),
                    just(Token::Less).to(BinaryOp::Lt),
                    just(Token::Greater).to(BinaryOp::Gt),
                ))
                .then(sum)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let equality = comparison
            .clone()
            .then(
                choice((
                    just(Token::EqualEqual).to(BinaryOp::Eq),
                    just(Token::NotEqual).to(BinaryOp::Ne),
                ))
                .then(comparison)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let conjunction = equality
            .clone()
            .then(
                just(Token::And)
                    .to(BinaryOp::And)
                    .then(equality)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let disjunction = conjunction
            .clone()
            .then(
                just(Token::Or)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        disjunction
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(cond, branches)| match branches {
                Some((then, otherwise)) => {
                    Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))
                }
                None => cond,
            })
            .boxed()
    })
}

fn file_parser<'a, I>() -> impl Parser<'a, I, SourceFile, ParserExtra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser();

    // Basic token parsers
    let ident = select! { Token::Ident(s) => s };
    let string = select! { Token::String(s) => s };
    let var_name = select! { Token::Var(s) => s };

    let dotted_name = ident.clone()
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|parts| parts.join("."));

    let attribute = ident.clone()
        .map_with(|name, e| Spanned::new(name, span_range(&e.span())))
        .then_ignore(just(Token::Equals))
        .then(
            expr.clone()
                .map_with(|value, e| Spanned::new(value, span_range(&e.span()))),
        )
        .map(|(name, value)| Attribute { name, value });

    let attributes = attribute.repeated().collect::<Vec<_>>();

    let directives = just(Token::Pipe)
        .ignore_then(ident.clone().map_with(|name, e| Spanned::new(name, span_range(&e.span()))))
        .repeated()
        .collect::<Vec<_>>();

    // `$a.b.c` written directly in a body prints it
    let print_shorthand = var_name.clone()
        .map(Expr::Var)
        .then(
            just(Token::Dot)
                .ignore_then(ident.clone())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(base, fields)| apply_fields(base, fields))
        .then(directives.clone());

    let print_command = just(Token::Print)
        .ignore_then(expr.clone())
        .then(directives.clone());

    let print = print_command.or(print_shorthand);

    let msg_part = choice((
        string.clone().map(MsgPartDecl::Text),
        print
            .clone()
            .map(|(expr, directives)| MsgPartDecl::Print { expr, directives }),
    ))
    .map_with(|part, e| Spanned::new(part, span_range(&e.span())));

    let msg = just(Token::Msg)
        .ignore_then(attributes.clone())
        .then(
            msg_part
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map(|(attributes, parts)| Stmt::Msg { attributes, parts });

    let css = just(Token::Css)
        .ignore_then(expr.clone().then_ignore(just(Token::Comma)).or_not())
        .then(string.clone().map_with(|s, e| Spanned::new(s, span_range(&e.span()))))
        .map(|(component, selector)| Stmt::Css {
            component,
            selector,
        });

    let xid = just(Token::Xid).ignore_then(string.clone()).map(Stmt::Xid);

    let callee = choice((
        just(Token::Dot)
            .ignore_then(ident.clone())
            .map(CalleeName::Relative),
        dotted_name.clone().map(CalleeName::Dotted),
    ))
    .map_with(|name, e| Spanned::new(name, span_range(&e.span())));

    let statement = recursive(|stmt| {
        let block = stmt
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose));

        let text = string.clone().map(Stmt::Text);

        let if_stmt = just(Token::If)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(
                just(Token::Elif)
                    .ignore_then(expr.clone())
                    .then(block.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then(just(Token::Else).ignore_then(block.clone()).or_not())
            .map(|((first, rest), otherwise)| {
                let mut branches = vec![first];
                branches.extend(rest);
                Stmt::If {
                    branches,
                    otherwise,
                }
            });

        let for_stmt = just(Token::For)
            .ignore_then(var_name.clone())
            .then_ignore(just(Token::Ident("in".to_string())))
            .then(expr.clone())
            .then(block.clone())
            .then(just(Token::IfEmpty).ignore_then(block.clone()).or_not())
            .map(|(((var, list), body), if_empty)| Stmt::For {
                var,
                list,
                body,
                if_empty,
            });

        let let_stmt = just(Token::Let)
            .ignore_then(var_name.clone())
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .map(|(var, value)| Stmt::Let { var, value });

        let call_param = just(Token::Param)
            .ignore_then(ident.clone().map_with(|name, e| Spanned::new(name, span_range(&e.span()))))
            .then(choice((
                just(Token::Equals)
                    .ignore_then(expr.clone())
                    .map(CallParamValueDecl::Expr),
                attributes
                    .clone()
                    .then(block.clone())
                    .map(|(attributes, body)| CallParamValueDecl::Block { attributes, body }),
            )))
            .map(|(name, value)| CallParamDecl { name, value });

        let call_params = call_param
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .or_not()
            .map(Option::unwrap_or_default);

        let call = just(Token::Call)
            .ignore_then(callee.clone())
            .then(attributes.clone())
            .then(call_params.clone())
            .map(|((callee, attributes), params)| Stmt::Call {
                callee,
                attributes,
                params,
            });

        let delcall = just(Token::Delcall)
            .ignore_then(
                dotted_name
                    .clone()
                    .map_with(|name, e| Spanned::new(name, span_range(&e.span()))),
            )
            .then(attributes.clone())
            .then(call_params)
            .map(|((name, attributes), params)| Stmt::Delcall {
                name,
                attributes,
                params,
            });

        choice((
            text,
            print
                .clone()
                .map(|(expr, directives)| Stmt::Print { expr, directives }),
            msg.clone(),
            css.clone(),
            xid.clone(),
            if_stmt,
            for_stmt,
            let_stmt,
            call,
            delcall,
        ))
        .map_with(|stmt, e| Spanned::new(stmt, span_range(&e.span())))
        .boxed()
    });

    let param_decl = just(Token::Param)
        .ignore_then(just(Token::Question).or_not())
        .then(ident.clone())
        .map_with(|(optional, name), e| {
            Spanned::new(
                ParamDecl {
                    name,
                    required: optional.is_none(),
                },
                span_range(&e.span()),
            )
        });

    let template_body = param_decl
        .repeated()
        .collect::<Vec<_>>()
        .then(statement.repeated().collect::<Vec<_>>())
        .delimited_by(just(Token::BraceOpen), just(Token::BraceClose));

    let basic_template = just(Token::Template)
        .ignore_then(just(Token::Dot).ignore_then(ident.clone()))
        .map(|partial_name| TemplateDeclKind::Basic { partial_name });

    let delegate_template = just(Token::Deltemplate)
        .ignore_then(dotted_name.clone())
        .map(|name| TemplateDeclKind::Delegate { name });

    let template = basic_template
        .or(delegate_template)
        .then(attributes.clone())
        .then(template_body)
        .map_with(|((kind, attributes), (params, body)), e| TemplateDecl {
            kind,
            attributes,
            params,
            body,
            span: span_range(&e.span()),
        });

    let header = choice((
        just(Token::Namespace)
            .ignore_then(dotted_name.clone())
            .then(attributes)
            .map(|(name, attributes)| Header::Namespace { name, attributes }),
        just(Token::Alias)
            .ignore_then(dotted_name.clone())
            .then(
                just(Token::Ident("as".to_string()))
                    .ignore_then(ident.clone().map_with(|alias, e| Spanned::new(alias, span_range(&e.span()))))
                    .or_not(),
            )
            .map(|(namespace, alias)| Header::Alias { namespace, alias }),
        just(Token::Delpackage)
            .ignore_then(dotted_name)
            .map(Header::Delpackage),
    ))
    .map_with(|header, e| Spanned::new(header, span_range(&e.span())));

    header
        .repeated()
        .collect::<Vec<_>>()
        .then(template.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|(headers, templates)| SourceFile { headers, templates })
}
