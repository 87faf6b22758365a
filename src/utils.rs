pub fn to_hex_str<T>(bytes: &T) -> String
where
    T: AsRef<[u8]> + ?Sized,
{
    let x = bytes.as_ref();

    x.iter()
        .map(|v| format!("{:02x}", v))
        .collect::<Vec<String>>()
        .join("")
}

pub trait VecInto<T> {
    fn vec_into(self) -> Vec<T>;
}

impl<F, T> VecInto<T> for Vec<F>
where
    F: Into<T>,
{
    fn vec_into(self) -> Vec<T> {
        self.into_iter().map(Into::into).collect()
    }
}

pub trait IndentString {
    fn indent(&self, n: usize) -> String;
}

impl<S> IndentString for S
where
    S: AsRef<str>,
{
    fn indent(&self, n: usize) -> String {
        let pad = " ".repeat(n);
        self.as_ref()
            .lines()
            .map(|line| format!("{}{}", pad, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
