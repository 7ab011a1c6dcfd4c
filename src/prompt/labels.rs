use crate::error::Error;
use crate::segmentation::{PointLabel, PointPrompt};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// Parse `X,Y` or `X,Y,LABEL` from the command line; the label defaults to foreground
pub fn parse_point(text: &str) -> Result<PointPrompt, Error> {
    let invalid = || Error::InvalidPoint(text.to_string());

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let (x, y, label) = match parts.as_slice() {
        [x, y] => (x, y, PointLabel::Foreground),
        [x, y, label] => {
            let label: i64 = label.parse().map_err(|_| invalid())?;
            (x, y, PointLabel::try_from(label)?)
        }
        _ => return Err(invalid()),
    };

    let x: f32 = x.parse().map_err(|_| invalid())?;
    let y: f32 = y.parse().map_err(|_| invalid())?;
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return Err(invalid());
    }

    Ok(PointPrompt::new(x, y, label))
}

/// Ask for a label for every point, re-asking until 0 or 1 is entered
///
/// Returns the points with their labels replaced. Running out of input is an
/// error rather than a silent default.
pub fn ask_labels<R: BufRead, W: Write>(
    points: &[PointPrompt],
    input: &mut R,
    output: &mut W,
) -> Result<Vec<PointPrompt>> {
    let mut labelled = Vec::with_capacity(points.len());

    for (idx, point) in points.iter().enumerate() {
        let label = loop {
            write!(
                output,
                "Enter the label for point {} ({:.0}, {:.0}) (1: foreground, 0: background): ",
                idx + 1,
                point.x,
                point.y
            )?;
            output.flush()?;

            let mut line = String::new();
            let read = input.read_line(&mut line).context("Failed to read label")?;
            if read == 0 {
                anyhow::bail!("Input closed before point {} was labelled", idx + 1);
            }

            match line.trim().parse::<i64>() {
                Ok(value) => match PointLabel::try_from(value) {
                    Ok(label) => break label,
                    Err(_) => writeln!(output, "Label must be 0 or 1.")?,
                },
                Err(_) => writeln!(output, "Please enter a number.")?,
            }
        };

        labelled.push(PointPrompt::new(point.x, point.y, label));
    }

    Ok(labelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_point_defaults_to_foreground() {
        assert_eq!(
            parse_point("120,45").unwrap(),
            PointPrompt::foreground(120.0, 45.0)
        );
        assert_eq!(
            parse_point(" 1.5 , 2 ,0").unwrap(),
            PointPrompt::background(1.5, 2.0)
        );
    }

    #[test]
    fn test_parse_point_rejects_bad_input() {
        assert!(matches!(parse_point("1,2,3"), Err(Error::InvalidLabel(3))));
        assert!(parse_point("1").is_err());
        assert!(parse_point("a,b").is_err());
        assert!(parse_point("1,2,3,4").is_err());
        assert!(parse_point("-1,2").is_err());
        assert!(parse_point("1,2,x").is_err());
    }

    #[test]
    fn test_ask_labels_reprompts() {
        let points = vec![
            PointPrompt::foreground(10.0, 20.0),
            PointPrompt::foreground(30.0, 40.0),
        ];
        let mut input = Cursor::new("abc\n5\n0\n1\n");
        let mut output = Vec::new();

        let labelled = ask_labels(&points, &mut input, &mut output).unwrap();
        assert_eq!(
            labelled,
            vec![
                PointPrompt::background(10.0, 20.0),
                PointPrompt::foreground(30.0, 40.0),
            ]
        );

        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("Please enter a number."));
        assert!(transcript.contains("Label must be 0 or 1."));
        assert!(transcript.contains("point 2 (30, 40)"));
    }

    #[test]
    fn test_ask_labels_eof_is_error() {
        let points = vec![PointPrompt::foreground(1.0, 1.0)];
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        assert!(ask_labels(&points, &mut input, &mut output).is_err());
    }
}
