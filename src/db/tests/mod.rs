mod episodes;
